//! Lodbrok client: broker transport, consumer groups, partition fetchers.
//!
//! The entry point is [`GroupConsumer`]: configure it with
//! [`ConsumerConfig`], call [`GroupConsumer::consume`], and read decoded
//! messages off the returned channel.
//!
//! ```no_run
//! use lodbrok_client::{ConsumerConfig, GroupConsumer};
//!
//! # async fn run() -> lodbrok_common::Result<()> {
//! let config = ConsumerConfig::new("127.0.0.1:9092", "events", "billing");
//! let consumer = GroupConsumer::new(config).await?;
//! let mut messages = consumer.consume(true);
//! while let Some(message) = messages.recv().await {
//!     println!("{}/{}@{}", message.topic, message.partition, message.message.offset);
//! }
//! # Ok(())
//! # }
//! ```

pub mod assignor;
pub mod broker;
pub mod brokers;
pub mod config;
pub mod fetcher;
pub mod group;

pub use assignor::{AssignmentStrategy, RangeAssignmentStrategy};
pub use broker::Broker;
pub use brokers::BrokerSet;
pub use config::{ConsumerConfig, OffsetsStorage};
pub use fetcher::FetchedMessage;
pub use group::GroupConsumer;
