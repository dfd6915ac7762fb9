pub mod order;
pub mod player;
pub mod snapshot;
pub mod suit;
pub mod trade;

pub use order::{Order, Quote, Side};
pub use player::Player;
pub use snapshot::{GameState, MarketQuote, Results, Snapshot};
pub use suit::{Color, Suit};
pub use trade::Trade;
