mod beacon;
mod engine;
mod midi_importer;
mod model;
mod morse;
mod pitch;
mod player;
mod transceiver;
mod util;

pub mod rtttl;

pub use beacon::*;
pub use engine::*;
pub use midi_importer::*;
pub use model::config::*;
pub use model::melody::*;
pub use model::notes::*;
pub use model::playlist::*;
pub use morse::*;
pub use pitch::*;
pub use player::*;
pub use transceiver::*;
pub use util::*;
