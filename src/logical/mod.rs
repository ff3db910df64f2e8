//! The request/response surface of the engine: a request names an operation and a path, the
//! backend routes it to the handler registered for that path and operation.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

pub mod backend;
pub mod lease;
pub mod path;
pub mod request;
pub mod response;
pub mod secret;

pub use backend::LogicalBackend;
pub use lease::Lease;
pub use path::{Path, PathOperation};
pub use request::Request;
pub use response::Response;
pub use secret::SecretData;

#[derive(Eq, PartialEq, Copy, Clone, Debug, EnumString, Display, Serialize, Deserialize)]
pub enum Operation {
    #[strum(to_string = "list")]
    List,
    #[strum(to_string = "read")]
    Read,
    #[strum(to_string = "write")]
    Write,
    #[strum(to_string = "delete")]
    Delete,
    #[strum(to_string = "renew")]
    Renew,
    #[strum(to_string = "revoke")]
    Revoke,
}

#[cfg(test)]
mod test {
    use std::str::FromStr;

    use super::*;

    #[test]
    fn test_operation_names() {
        assert_eq!(Operation::Renew.to_string(), "renew");
        assert_eq!(Operation::from_str("revoke").unwrap(), Operation::Revoke);
        assert!(Operation::from_str("help").is_err());
    }
}
