//! rlink - Drive a long-lived R interpreter from Rust.
//!
//! Commands are written to the interpreter's stdin. Data and command results
//! come back over a loopback HTTP endpoint owned by the [`Session`]: the
//! interpreter fetches pushed values from it and delivers pulled values and
//! result records to it.
//!
//! Tabular data moves as a [`Table`], which keeps each column's element type
//! across the boundary.
//!
//! # Example
//!
//! ```rust,ignore
//! use rlink::{values, Session, Table};
//!
//! #[tokio::main]
//! async fn main() -> rlink::Result<()> {
//!     let mut session = Session::builder().connect().await?;
//!
//!     session.push(&[4.0, 5.0, 6.0], "mydata").await?;
//!     session.run("mydata = mydata + 1").await?;
//!     let bumped: Vec<f64> = session.pull("mydata").await?;
//!     println!("{:?}", bumped);
//!
//!     let mut table = Table::new(["a", "b"]);
//!     table.append_unnamed_row(values![1, "x"]);
//!     session.push_table(&table, "df").await?;
//!
//!     session.close().await
//! }
//! ```

pub mod config;
pub mod endpoint;
pub mod error;
pub mod interpreter;
pub mod plot;
pub mod protocol;
pub mod rendezvous;
pub mod session;
pub mod store;
pub mod table;

// Re-export commonly used types
pub use endpoint::{EndpointHandle, TransferEndpoint};
pub use error::{Result, RlinkError};
pub use interpreter::{check_dependencies, Interpreter, RProcess};
pub use plot::GraphConfig;
pub use protocol::ResultRecord;
pub use rendezvous::{Delivery, RendezvousRegistry, RendezvousSlot};
pub use session::{Session, SessionBuilder};
pub use store::BlobStore;
pub use table::{Column, Row, SimpleData, Table, Value};
