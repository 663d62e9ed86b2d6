use thiserror::Error;

use crate::model::{ContentError, ParseIdError};
use crate::settings::ConfigError;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Content(#[from] ContentError),
    #[error(transparent)]
    Id(#[from] ParseIdError),
}
