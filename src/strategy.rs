use crate::models::{Bar, Direction, OpenPosition, TradeRecord};

/// What the strategy wants the engine to do with an instrument on a bar.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Decision {
    Hold,
    Enter { direction: Direction, size: i64 },
    Exit,
}

pub trait Strategy {
    /// Called once per instrument per bar, in fixed instrument order. The
    /// engine fills `Enter`/`Exit` at the close of the decision bar.
    fn decide(
        &mut self,
        symbol: &str,
        bars: &[Bar],
        index: usize,
        position: Option<&OpenPosition>,
        available_cash: f64,
    ) -> Decision;

    /// Fired exactly once per closed trade, after the fill is booked.
    fn on_trade_closed(&mut self, _record: &TradeRecord) {}

    /// Bars the strategy needs before it can decide anything. The engine
    /// skips `decide` entirely for each instrument's first `warmup_bars`
    /// bars.
    fn warmup_bars(&self) -> usize {
        0
    }
}

#[path = "strategies/breakout.rs"]
pub mod breakout;

pub use breakout::{BreakoutConfig, BreakoutStrategy};
