//! Settings read from environment variables.

/// Boolean switches controlled by environment variables.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Flag {
    /// `TILEPACK_TIMING`: print the time taken by each prepack call.
    Timing,

    /// `TILEPACK_FORCE_GENERIC`: use the generic kernel even if a faster one
    /// is supported.
    ForceGeneric,
}

impl Flag {
    /// Return the name of the environment variable for this flag.
    pub fn var_name(self) -> &'static str {
        match self {
            Flag::Timing => "TILEPACK_TIMING",
            Flag::ForceGeneric => "TILEPACK_FORCE_GENERIC",
        }
    }

    /// Return true if the flag is set to a true value. Unset flags are off.
    pub fn is_enabled(self) -> bool {
        env_flag(self.var_name(), false)
    }
}

/// Parse a flag value such as "1", "yes" or "off". Case is ignored.
fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "t" | "yes" | "y" | "on" => Some(true),
        "0" | "false" | "f" | "no" | "n" | "off" | "" => Some(false),
        _ => None,
    }
}

/// Read the boolean environment variable `name`, returning `default` if it
/// is unset or has an unrecognized value.
fn env_flag(name: &str, default: bool) -> bool {
    let Ok(value) = std::env::var(name) else {
        return default;
    };
    parse_bool(&value).unwrap_or_else(|| {
        eprintln!("Unrecognized value \"{}\" for {}", value, name);
        default
    })
}
