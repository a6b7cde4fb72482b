//! Ports - 抽象化レイヤー
//!
//! Hexagonal Architecture の「ポート」。
//! host UI / backend / storage / 時刻はすべてここで trait に切り出し、
//! scheduler と interceptor は実装を知らない。

pub mod clock;
pub mod id_generator;
pub mod kv_store;
pub mod locator;
pub mod send_pipeline;
pub mod token;

pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::kv_store::KeyValueStore;
pub use self::locator::ElementLocator;
pub use self::send_pipeline::{SendPipeline, SentMessage};
pub use self::token::TokenProvider;
