pub use anyhow::{bail, ensure, Context as _};
pub use log::{debug, error, info, trace, warn};

pub const EXPECT_LOGGER_INITIALIZED: &str = "logger is not initialized";
