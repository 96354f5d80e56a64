#[allow(unused_imports)]
pub(crate) use anyhow::{anyhow, bail, Result};

#[allow(unused_imports)]
pub(crate) use tracing::{debug, error, info, span, trace, warn, Level};

pub use logging::{i_ln, i_lns, i_nln, i_nlns, LoggingConfig, LoggingConfigTrait};

pub mod logging;
pub mod target_dir;
