//! Driver Module
//!
//! The client API on top of the wire layer in [`crate::bolt`].
//!
//! - [`Driver`]: parses the server URL and pools idle sessions
//! - [`Session`]: runs statements on one connection
//! - [`Transaction`]: explicit BEGIN / COMMIT / ROLLBACK
//! - [`StatementResult`]: lazily streamed records and the result summary
//! - [`Connection`]: request pipelining and reply demultiplexing
//!
//! # Example
//!
//! ```no_run
//! use bolt_driver::driver::{driver, DriverConfig};
//! use bolt_driver::params;
//!
//! # async fn example() -> bolt_driver::DriverResult<()> {
//! let driver = driver("bolt://localhost:7687", DriverConfig::default())?;
//! let session = driver.session().await?;
//!
//! let mut result = session
//!     .run("MATCH (p:Person {name: $name}) RETURN p.age AS age", Some(params! {"name" => "Alice"}))
//!     .await?;
//! while let Some(record) = result.next().await? {
//!     println!("{}", record["age"]);
//! }
//!
//! session.close().await?;
//! driver.close().await;
//! # Ok(())
//! # }
//! ```

mod connection;
mod driver;
mod error;
mod pool;
mod record;
mod response;
mod result;
mod session;
#[cfg(feature = "tls")]
mod tls;
mod transaction;
mod types;

// Re-exports
pub use connection::{
    connect, ConnectOptions, Connection, ConnectionHealth, SharedConnection, Transport,
    DEFAULT_CONNECTION_TIMEOUT, DEFAULT_USER_AGENT,
};
pub use driver::{
    driver, Driver, DriverConfig, DriverConfigBuilder, GraphDatabase, ServerAddress,
    TrustStrategy, BOLT_SCHEME, DEFAULT_MAX_POOL_SIZE, DEFAULT_PORT,
};
pub use error::{DriverError, DriverResult, ResultError};
pub use pool::{PoolMetrics, SessionPool};
pub use record::Record;
pub use response::{Completion, Outcome, Response, ResponseHandler};
pub use result::{
    Counters, InputPosition, Notification, Plan, ResultSummary, StatementResult, StatementType,
};
pub use session::{Query, Session};
#[cfg(feature = "tls")]
pub use tls::TlsConnector;
pub use transaction::Transaction;
pub use types::{Node, Path, Relationship, Value};

pub use crate::bolt::AuthToken;

/// Builds a `HashMap<String, Value>` of statement parameters.
///
/// ```
/// use bolt_driver::{params, Value};
///
/// let p = params! {"name" => "Alice", "age" => 33};
/// assert_eq!(p["age"], Value::Integer(33));
/// ```
#[macro_export]
macro_rules! params {
    () => {
        ::std::collections::HashMap::<::std::string::String, $crate::driver::Value>::new()
    };
    ($($key:expr => $value:expr),+ $(,)?) => {{
        let mut map = ::std::collections::HashMap::<::std::string::String, $crate::driver::Value>::new();
        $(
            map.insert(::std::string::String::from($key), $crate::driver::Value::from($value));
        )+
        map
    }};
}
