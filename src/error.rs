use thiserror::Error;

/// Errors produced while configuring or running the labyrinth control loop.
#[derive(Error, Debug)]
pub enum LabyrinthError {
    /// A configuration value failed validation.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The maze has no checkpoints to pursue.
    #[error("maze has no checkpoints")]
    EmptyMaze,

    /// No built-in maze has the requested name.
    #[error("unknown maze '{0}'")]
    UnknownMaze(String),

    /// The configuration file could not be parsed.
    #[error("failed to parse configuration: {0}")]
    Config(#[from] toml::de::Error),

    /// Filesystem failure while reading config or exporting logs.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// The camera could not deliver a frame. Fatal to the run.
    #[error("frame source failed: {0}")]
    FrameSource(String),

    /// A timing histogram could not be created.
    #[error("metrics setup failed: {0}")]
    Metrics(String),

    /// Chart rendering failed.
    #[error("chart rendering failed: {0}")]
    Chart(String),
}

pub type Result<T> = std::result::Result<T, LabyrinthError>;
