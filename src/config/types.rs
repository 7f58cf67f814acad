use serde::Deserialize;

// -------------------------------------------------------------------------------------------------
// ---- LogLevel -----------------------------------------------------------------------------------

#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

// -------------------------------------------------------------------------------------------------
// ---- HandlerFaultPolicy -------------------------------------------------------------------------

/// What the gateway does when the engine fails a request it could parse.
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HandlerFaultPolicy {
    /// Log it and send nothing.
    Drop,
    /// Ask the engine to format an error frame and send it.
    #[default]
    Respond,
}

// -------------------------------------------------------------------------------------------------
// -------------------------------------------------------------------------------------------------
