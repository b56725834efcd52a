mod chat;
mod constants;
mod game;
mod player;
mod ticket;

pub use chat::*;
pub use constants::*;
pub use game::*;
pub use player::*;
pub use ticket::*;

#[cfg(test)]
mod tests;
