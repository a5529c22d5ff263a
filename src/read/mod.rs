//! Reading event lists back from disk. Every reader gives each rank its own
//! slice of the stored events.

mod event_file;
mod h5;
