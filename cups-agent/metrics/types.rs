// Published quantities and the utilization domains they come from

use crate::metric_enum;

metric_enum! {
    pub enum Domain {
        Core => "core",
        Iio => "iio",
        Memory => "memory",
    }
}

metric_enum! {
    pub enum SensorKind {
        HostCpuUtilization => "HostCpuUtilization",
        HostPciBandwidthUtilization => "HostPciBandwidthUtilization",
        HostMemoryBandwidthUtilization => "HostMemoryBandwidthUtilization",
        CupsIndex => "CupsIndex",
        AverageHostCpuUtilization => "AverageHostCpuUtilization",
        AverageHostPciBandwidthUtilization => "AverageHostPciBandwidthUtilization",
        AverageHostMemoryBandwidthUtilization => "AverageHostMemoryBandwidthUtilization",
        AverageCupsIndex => "AverageCupsIndex",
    }
}

impl SensorKind {
    /// Instantaneous utilization sensor of a domain
    pub fn utilization(domain: Domain) -> Self {
        match domain {
            Domain::Core => SensorKind::HostCpuUtilization,
            Domain::Iio => SensorKind::HostPciBandwidthUtilization,
            Domain::Memory => SensorKind::HostMemoryBandwidthUtilization,
        }
    }

    /// Rolling average sensor observing `self`, if `self` is instantaneous
    pub fn average(&self) -> Option<Self> {
        match self {
            SensorKind::HostCpuUtilization => Some(SensorKind::AverageHostCpuUtilization),
            SensorKind::HostPciBandwidthUtilization => {
                Some(SensorKind::AverageHostPciBandwidthUtilization)
            }
            SensorKind::HostMemoryBandwidthUtilization => {
                Some(SensorKind::AverageHostMemoryBandwidthUtilization)
            }
            SensorKind::CupsIndex => Some(SensorKind::AverageCupsIndex),
            _ => None,
        }
    }

    pub fn is_average(&self) -> bool {
        self.average().is_none()
    }

    pub fn instantaneous() -> Vec<SensorKind> {
        Self::all().into_iter().filter(|k| !k.is_average()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names() {
        assert_eq!(SensorKind::all().len(), 8);
        assert_eq!(SensorKind::CupsIndex.name(), "CupsIndex");
        assert_eq!(
            SensorKind::AverageHostMemoryBandwidthUtilization.name(),
            "AverageHostMemoryBandwidthUtilization"
        );
        assert_eq!(Domain::Iio.name(), "iio");
    }

    #[test]
    fn test_average_pairs() {
        assert_eq!(SensorKind::instantaneous().len(), 4);
        for kind in SensorKind::instantaneous() {
            let average = kind.average().unwrap();
            assert!(average.is_average());
            assert_eq!(average.name(), format!("Average{}", kind.name()));
        }
    }

    #[test]
    fn test_domain_sensors() {
        assert_eq!(
            SensorKind::utilization(Domain::Core),
            SensorKind::HostCpuUtilization
        );
        assert_eq!(
            SensorKind::utilization(Domain::Memory),
            SensorKind::HostMemoryBandwidthUtilization
        );
    }
}
