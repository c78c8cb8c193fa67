// src/gps/mod.rs
//! Location sources, parsing and sampling

pub mod data;
pub mod filter;
pub mod gpsd;
pub mod nmea;
pub mod provider;
pub mod source;

pub use data::{Coordinate, FixState, LocationSample};
pub use provider::{
    Accuracy, BackgroundHandler, BackgroundOptions, BackgroundUpdates, LocationProvider,
    LocationWatch, NotificationDescriptor, PermissionStatus, WatchOptions,
};
pub use source::LocationSource;
