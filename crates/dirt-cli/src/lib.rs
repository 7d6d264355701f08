//! DirtGenie CLI support: where planned trips live on disk.
//!
//! The `dirtgenie` binary plans a tour and writes it to a trip directory;
//! `dirtgenie revise` reads that directory back.

pub mod trip;

pub use trip::{load_trip, save_revision, save_trip, trip_dir_name, SavedTrip};
