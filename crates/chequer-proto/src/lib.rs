//! Chequer wire and data model.
//!
//! Pure data types shared by the server-side generators and the client-side
//! connection manager. Nothing in this crate performs I/O or keeps time; the
//! types only describe race state and the records exchanged over a streaming
//! connection.
//!
//! # Components
//!
//! - [`Entry`] and [`SessionSnapshot`]: the race state model
//! - [`TimelineEvent`] and [`RaceLog`]: the precomputed replay log
//! - [`StreamMessage`]: the envelope pushed to viewers
//! - [`Notification`]: lifecycle and data notifications for the consuming
//!   application
//! - [`duration`]: race-clock formatting (`H:MM:SS.mmm`)
//!
//! # Encoding
//!
//! Frames are JSON text. Field names are camelCase on the wire; tagged unions
//! use an explicit discriminant field (`kind` for gaps, `type` for
//! notifications).

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod duration;
mod entry;
mod error;
mod message;
mod notification;
mod session;
mod timeline;

pub use entry::{
    CarNumber, CarStatus, Driver, DriverCategory, Entry, EntryIdentity, Gap, PitState,
    TireCompound, Timing, TimingState,
};
pub use error::{ProtocolError, Result};
pub use message::{CarUpdate, MessageBody, StreamMessage};
pub use notification::{ErrorKind, ErrorReason, Notification};
pub use session::{FlagType, SectorFlag, SessionClock, SessionSnapshot, SessionStatus, Weather};
pub use timeline::{
    CarEvent, EventType, GridCar, GridDriver, GridSlot, LapRecord, LapsFile, RaceEvent, RaceLog,
    TimelineEvent,
};
