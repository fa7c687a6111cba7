use thiserror::Error;

pub type Result<T> = std::result::Result<T, DispatchError>;

#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("dispatcher is not running")]
    NotRunning,

    #[error("dispatcher dropped the acknowledgement")]
    AckDropped,
}
