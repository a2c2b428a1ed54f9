//! Declarative macros to reduce boilerplate across the cups codebase

/// Define a metric enum with automatic `name()` and `all()` implementations
///
/// # Example
/// ```
/// use cups::metric_enum;
///
/// metric_enum! {
///     pub enum Domain {
///         Core => "Core",
///         Iio => "Iio",
///         Memory => "Memory",
///     }
/// }
///
/// let domain = Domain::Core;
/// assert_eq!(domain.name(), "Core");
/// assert_eq!(Domain::all().len(), 3);
/// ```
///
/// Expands to:
/// - An enum with Debug, Clone, Copy, PartialEq, Eq, Hash derives
/// - A `name(&self) -> &'static str` method
/// - An `all() -> Vec<Self>` method
#[macro_export]
macro_rules! metric_enum {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident {
            $($variant:ident => $str:literal),* $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        $vis enum $name {
            $($variant,)*
        }

        impl $name {
            pub fn name(&self) -> &'static str {
                match self {
                    $($name::$variant => $str,)*
                }
            }

            pub fn all() -> Vec<$name> {
                vec![$($name::$variant,)*]
            }
        }
    };
}

/// Gather metrics from an exporter's registry
///
/// # Example
/// ```ignore
/// // In api.rs metrics handler
/// let mut buffer = Vec::new();
/// gather_metrics!(buffer, encoder, state.exporter, "CUPS");
/// ```
#[macro_export]
macro_rules! gather_metrics {
    ($buffer:expr, $encoder:expr, $exporter:expr, $name:literal) => {
        if let Some(ref exporter) = $exporter {
            let metric_families = exporter.registry().gather();
            if let Err(e) = $encoder.encode(&metric_families, &mut $buffer) {
                tracing::error!(concat!("Failed to encode ", $name, " metrics: {}"), e);
            }
        }
    };
}

/// Read a PECI value during discovery, turning failure into a discovery error
///
/// # Example
/// ```ignore
/// let mask = discover!(address, adapter.get_core_mask_low(address, model), "get_core_mask_low");
/// ```
#[macro_export]
macro_rules! discover {
    ($address:expr, $call:expr, $what:literal) => {
        $call.map_err(|e| $crate::error::CupsError::discovery($address, format!(concat!($what, "() failed: {}"), e)))?
    };
}
