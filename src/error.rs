//! Command-line Error Types

use derive_more::{Display, Error};

pub type Error = exn::Exn<ErrorKind>;
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    #[display("configuration error")]
    Config,
    /// No access token from the command line, the environment or the config file.
    #[display("no API token: pass --token or set FIGPACK_API__TOKEN")]
    MissingToken,
    #[display("failed to set up {_0}")]
    Setup(#[error(not(source))] &'static str),
    #[display("export failed")]
    Export,
    #[display("failed to write {_0}")]
    Output(#[error(not(source))] String),
    #[display("interrupted")]
    Interrupted,
}
