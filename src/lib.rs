//! # Bolt Driver
//!
//! An async client driver for graph databases speaking the Bolt v1 wire
//! protocol.
//!
//! ## Features
//!
//! - **Bolt v1** - Handshake, chunked framing, PackStream and the v1 message set
//! - **Pipelining** - RUN and PULL_ALL go out together; replies are matched in order
//! - **Lazy results** - Records are read from the socket only as they are asked for
//! - **Session pooling** - Idle sessions are reset and reused, most recent first
//! - **Transactions** - Explicit BEGIN / COMMIT / ROLLBACK with rollback on error
//! - **TLS** - Optional, behind the `tls` feature
//!
//! ## Basic Usage
//!
//! ```rust,no_run
//! use bolt_driver::{driver, params, AuthToken, DriverConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = DriverConfig::builder()
//!         .with_encrypted(false)
//!         .with_auth(AuthToken::basic("neo4j", "password"))
//!         .build();
//!     let driver = driver("bolt://localhost:7687", config)?;
//!
//!     let session = driver.session().await?;
//!     let mut result = session
//!         .run("CREATE (n:Person {name: $name}) RETURN n", Some(params! {"name" => "Alice"}))
//!         .await?;
//!
//!     for key in result.keys().await? {
//!         println!("column: {}", key);
//!     }
//!     while let Some(record) = result.next().await? {
//!         println!("{}", record);
//!     }
//!
//!     session.close().await?;
//!     driver.close().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Transactions
//!
//! `commit` marks the transaction successful; `close` sends COMMIT or
//! ROLLBACK accordingly.
//!
//! ```rust,no_run
//! # use bolt_driver::{driver, DriverConfig};
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! # let driver = driver("bolt://localhost:7687", DriverConfig::default())?;
//! # let session = driver.session().await?;
//! let tx = session.begin_transaction().await?;
//! tx.run("CREATE (n:Node {id: 1})", None).await?;
//! tx.run("CREATE (n:Node {id: 2})", None).await?;
//! tx.commit()?;
//! tx.close().await?;
//!
//! // Scoped: an error from the closure rolls back.
//! let created = session
//!     .run_transaction(|tx| async move {
//!         let mut result = tx.run("CREATE (n:Node) RETURN id(n) AS id", None).await?;
//!         let id = result.single().await?.get_int("id")?;
//!         tx.commit()?;
//!         Ok::<_, bolt_driver::DriverError>(id)
//!     })
//!     .await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`driver`] - Driver, sessions, transactions and results
//! - [`bolt`] - Low-level Bolt protocol implementation

#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod bolt;
pub mod driver;

// Re-exports for convenience
pub use driver::{
    driver, AuthToken, Driver, DriverConfig, DriverConfigBuilder, DriverError, DriverResult,
    GraphDatabase, Node, Path, Query, Record, Relationship, ResultSummary, ServerAddress,
    Session, StatementResult, Transaction, TrustStrategy, Value,
};

pub use bolt::{BoltError, PackStreamValue};

/// Config alias for convenience
pub type Config = DriverConfig;
