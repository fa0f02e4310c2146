// Domain models shared by the engine, worker and HTTP routes

mod flow;
mod state;

pub use flow::{Direction, PortCounter, RateSample};
pub use state::{CollectionState, Directive};
