use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use super::Family::*;
use super::{Bias, Family, HeightThresholds};
use crate::{Error, Result};

const fn h(bull_up: f64, bear_up: f64, bull_down: f64, bear_down: f64) -> Option<HeightThresholds> {
    Some(HeightThresholds::new(bull_up, bear_up, bull_down, bear_down))
}

const NONE: Option<HeightThresholds> = None;

/// The bear-market down-breakout cell has no trustworthy value
const TRIPLE_BOTTOM: Option<HeightThresholds> = Some(HeightThresholds {
    bear_down: None,
    ..HeightThresholds::new(13.5, 17.1, 13.2, 0.0)
});

macro_rules! define_pattern_types {
    (
        $(
            $variant:ident => $name:literal, $family:expr, $bias:ident, $heights:expr
        );* $(;)?
    ) => {
        /// Every chart pattern, event and candlestick the outcome engine knows
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub enum PatternType {
            $($variant),*
        }

        impl PatternType {
            pub const ALL: &'static [PatternType] = &[$(PatternType::$variant),*];

            /// Display name
            pub fn name(self) -> &'static str {
                match self {
                    $(PatternType::$variant => $name),*
                }
            }

            pub fn family(self) -> Family {
                match self {
                    $(PatternType::$variant => $family),*
                }
            }

            pub fn bias(self) -> Bias {
                match self {
                    $(PatternType::$variant => Bias::$bias),*
                }
            }

            /// `None` for types that are never classified tall or short
            pub fn height_thresholds(self) -> Option<HeightThresholds> {
                match self {
                    $(PatternType::$variant => $heights),*
                }
            }
        }
    };
}

define_pattern_types! {
    // Formations
    BroadeningBottom => "Broadening bottom", Formation, Either, h(14.5, 16.2, 13.9, 16.0);
    BroadeningTop => "Broadening top", Formation, Either, h(15.1, 17.4, 14.3, 15.8);
    BroadeningFormationAscending => "Broadening formation, right-angled and ascending", Formation, Either, h(12.6, 14.1, 12.0, 13.3);
    BroadeningFormationDescending => "Broadening formation, right-angled and descending", Formation, Either, h(13.4, 15.5, 12.8, 14.7);
    BroadeningWedgeAscending => "Broadening wedge, ascending", Formation, Either, h(13.3, 15.9, 12.9, 14.4);
    BroadeningWedgeDescending => "Broadening wedge, descending", Formation, Either, h(15.2, 18.0, 14.1, 16.6);
    BumpAndRunReversalBottom => "Bump-and-run reversal bottom", Formation, Up, h(31.0, 38.5, 29.1, 34.0);
    BumpAndRunReversalTop => "Bump-and-run reversal top", Formation, Down, h(24.2, 29.7, 22.6, 26.3);
    CupWithHandle => "Cup with handle", Formation, Up, h(20.4, 24.8, 18.8, 22.5);
    CupWithHandleInverted => "Cup with handle, inverted", Formation, Down, h(17.9, 21.3, 16.5, 19.6);
    DiamondBottom => "Diamond bottom", Formation, Either, h(13.6, 16.3, 12.7, 15.1);
    DiamondTop => "Diamond top", Formation, Either, h(11.8, 14.0, 11.2, 13.2);
    HornBottom => "Horn bottom", Formation, Up, h(12.1, 14.5, 11.0, 13.1);
    HornTop => "Horn top", Formation, Down, h(10.6, 12.9, 10.2, 12.0);
    IslandReversal => "Island reversal", Formation, Either, h(14.9, 18.1, 13.8, 16.4);
    IslandLong => "Island, long", Formation, Either, h(16.3, 19.5, 15.0, 18.2);
    PipeBottom => "Pipe bottom", Formation, Up, h(11.4, 13.8, 10.9, 12.6);
    PipeTop => "Pipe top", Formation, Down, h(10.1, 12.2, 9.8, 11.5);
    RectangleBottom => "Rectangle bottom", Formation, Either, h(12.5, 15.0, 10.0, 12.5);
    RectangleTop => "Rectangle top", Formation, Either, h(10.4, 12.8, 9.7, 11.9);
    RoundingBottom => "Rounding bottom", Formation, Up, h(26.0, 30.4, 24.1, 28.2);
    RoundingTop => "Rounding top", Formation, Down, h(20.3, 24.6, 19.0, 22.7);
    ScallopAscending => "Scallop, ascending", Formation, Up, h(13.2, 15.7, 12.4, 14.8);
    ScallopAscendingInverted => "Scallop, ascending and inverted", Formation, Down, h(12.0, 14.3, 11.6, 13.5);
    ScallopDescending => "Scallop, descending", Formation, Down, h(13.9, 16.6, 13.0, 15.4);
    ScallopDescendingInverted => "Scallop, descending and inverted", Formation, Up, h(12.7, 15.2, 12.1, 14.0);

    // Confirmed at the middle pivot
    DoubleBottomAdamAdam => "Double bottom, Adam & Adam", Confirmation, Up, h(13.8, 16.9, 12.5, 15.0);
    DoubleBottomAdamEve => "Double bottom, Adam & Eve", Confirmation, Up, h(14.2, 17.0, 13.1, 15.6);
    DoubleBottomEveAdam => "Double bottom, Eve & Adam", Confirmation, Up, h(13.5, 16.1, 12.6, 15.2);
    DoubleBottomEveEve => "Double bottom, Eve & Eve", Confirmation, Up, h(14.6, 17.8, 13.3, 16.0);
    DoubleTopAdamAdam => "Double top, Adam & Adam", Confirmation, Down, h(11.9, 14.4, 11.4, 13.6);
    DoubleTopAdamEve => "Double top, Adam & Eve", Confirmation, Down, h(12.3, 14.8, 11.7, 13.9);
    DoubleTopEveAdam => "Double top, Eve & Adam", Confirmation, Down, h(11.6, 13.9, 11.1, 13.0);
    DoubleTopEveEve => "Double top, Eve & Eve", Confirmation, Down, h(12.8, 15.3, 12.2, 14.5);
    BigM => "Big M", Confirmation, Down, h(12.4, 14.7, 11.8, 14.1);
    BigW => "Big W", Confirmation, Up, h(16.1, 19.2, 15.3, 18.0);
    TripleBottom => "Triple bottom", Confirmation, Up, TRIPLE_BOTTOM;
    TripleTop => "Triple top", Confirmation, Down, h(12.2, 14.6, 11.5, 13.7);
    ThreeRisingValleys => "Three rising valleys", Confirmation, Up, h(15.4, 18.3, 14.6, 17.2);
    ThreeFallingPeaks => "Three falling peaks", Confirmation, Down, h(13.7, 16.4, 12.9, 15.3);
    UglyDoubleBottom => "Ugly double bottom", Confirmation, Up, h(17.0, 20.2, 15.9, 18.8);

    // Reflected about the neckline
    HeadAndShouldersBottom => "Head-and-shoulders bottom", Neckline, Up, h(14.4, 17.6, 13.4, 16.2);
    HeadAndShouldersComplexBottom => "Head-and-shoulders bottom, complex", Neckline, Up, h(15.6, 18.7, 14.2, 17.1);
    HeadAndShouldersTop => "Head-and-shoulders top", Neckline, Down, h(12.9, 15.4, 12.1, 14.6);
    HeadAndShouldersComplexTop => "Head-and-shoulders top, complex", Neckline, Down, h(13.1, 15.8, 12.4, 14.9);

    // Two extrapolated trendlines
    TriangleAscending => "Triangle, ascending", Trendline, Either, h(12.3, 14.6, 11.6, 13.8);
    TriangleDescending => "Triangle, descending", Trendline, Either, h(13.0, 15.5, 12.2, 14.4);
    TriangleSymmetrical => "Triangle, symmetrical", Trendline, Either, h(12.9, 15.1, 12.0, 14.2);
    WedgeFalling => "Wedge, falling", Trendline, Either, h(12.7, 15.3, 11.9, 14.0);
    WedgeRising => "Wedge, rising", Trendline, Either, h(11.2, 13.6, 10.8, 12.7);

    // Sloped channels
    ChannelAscending => "Channel, ascending", Channel, Either, h(11.0, 13.2, 10.5, 12.4);
    ChannelDescending => "Channel, descending", Channel, Either, h(11.7, 14.1, 11.1, 13.0);
    ChannelHorizontal => "Channel, horizontal", Channel, Either, h(10.3, 12.4, 9.9, 11.8);

    // Repeat the first leg
    FlagBullish => "Flag, bullish", MeasuredMove, Up, NONE;
    FlagBearish => "Flag, bearish", MeasuredMove, Down, NONE;
    FlagHighAndTight => "High and tight flag", MeasuredMove, Up, NONE;
    PennantBullish => "Pennant, bullish", MeasuredMove, Up, NONE;
    PennantBearish => "Pennant, bearish", MeasuredMove, Down, NONE;
    MeasuredMoveUp => "Measured move up", MeasuredMove, Up, h(18.2, 21.9, 17.0, 20.3);
    MeasuredMoveDown => "Measured move down", MeasuredMove, Down, h(16.8, 20.1, 15.7, 18.9);

    // Harmonic and ABCD
    AbcdBullish => "ABCD, bullish", Fibonacci, Up, NONE;
    AbcdBearish => "ABCD, bearish", Fibonacci, Down, NONE;
    BatBullish => "Bat, bullish", Fibonacci, Up, NONE;
    BatBearish => "Bat, bearish", Fibonacci, Down, NONE;
    ButterflyBullish => "Butterfly, bullish", Fibonacci, Up, NONE;
    ButterflyBearish => "Butterfly, bearish", Fibonacci, Down, NONE;
    CrabBullish => "Crab, bullish", Fibonacci, Up, NONE;
    CrabBearish => "Crab, bearish", Fibonacci, Down, NONE;
    GartleyBullish => "Gartley, bullish", Fibonacci, Up, NONE;
    GartleyBearish => "Gartley, bearish", Fibonacci, Down, NONE;
    SharkBullish => "Shark, bullish", Fibonacci, Up, NONE;
    SharkBearish => "Shark, bearish", Fibonacci, Down, NONE;
    ThreeDrivesBullish => "Three drives, bullish", Fibonacci, Up, NONE;
    ThreeDrivesBearish => "Three drives, bearish", Fibonacci, Down, NONE;
    FibonacciRetrace => "Fibonacci retrace", Fibonacci, Either, NONE;

    // Events
    DeadCatBounce => "Dead-cat bounce", FixedPercent(10.0), Down, NONE;
    DeadCatBounceInverted => "Dead-cat bounce, inverted", FixedPercent(10.0), Up, NONE;
    EarningsSurpriseBad => "Earnings surprise, bad", FixedPercent(8.0), Down, NONE;
    EarningsSurpriseGood => "Earnings surprise, good", FixedPercent(8.0), Up, NONE;
    StockDowngrade => "Stock downgrade", FixedPercent(6.0), Down, NONE;
    StockUpgrade => "Stock upgrade", FixedPercent(6.0), Up, NONE;

    // Gaps
    GapArea => "Gap, area", FixedPercent(3.0), Either, NONE;
    GapBreakaway => "Gap, breakaway", FixedPercent(8.0), Either, NONE;
    GapContinuation => "Gap, continuation", FixedPercent(8.0), Either, NONE;
    GapExhaustion => "Gap, exhaustion", FixedPercent(5.0), Either, NONE;

    // Candlesticks
    AbandonedBabyBearish => "Abandoned baby, bearish", FixedPercent(5.0), Down, NONE;
    AbandonedBabyBullish => "Abandoned baby, bullish", FixedPercent(5.0), Up, NONE;
    DarkCloudCover => "Dark cloud cover", FixedPercent(4.0), Down, NONE;
    Doji => "Doji", FixedPercent(3.0), Either, NONE;
    EngulfingBearish => "Engulfing, bearish", FixedPercent(4.0), Down, NONE;
    EngulfingBullish => "Engulfing, bullish", FixedPercent(4.0), Up, NONE;
    EveningStar => "Evening star", FixedPercent(5.0), Down, NONE;
    FallingThreeMethods => "Falling three methods", FixedPercent(5.0), Down, NONE;
    Hammer => "Hammer", FixedPercent(3.0), Up, NONE;
    HangingMan => "Hanging man", FixedPercent(3.0), Down, NONE;
    HaramiBearish => "Harami, bearish", FixedPercent(3.0), Down, NONE;
    HaramiBullish => "Harami, bullish", FixedPercent(3.0), Up, NONE;
    InsideDay => "Inside day", FixedPercent(3.0), Either, NONE;
    InvertedHammer => "Inverted hammer", FixedPercent(3.0), Up, NONE;
    KickingBearish => "Kicking, bearish", FixedPercent(5.0), Down, NONE;
    KickingBullish => "Kicking, bullish", FixedPercent(5.0), Up, NONE;
    MarubozuBlack => "Marubozu, black", FixedPercent(4.0), Down, NONE;
    MarubozuWhite => "Marubozu, white", FixedPercent(4.0), Up, NONE;
    MorningStar => "Morning star", FixedPercent(5.0), Up, NONE;
    NarrowRange7 => "Narrow range 7", FixedPercent(4.0), Either, NONE;
    OutsideDay => "Outside day", FixedPercent(3.0), Either, NONE;
    PiercingPattern => "Piercing pattern", FixedPercent(4.0), Up, NONE;
    RisingThreeMethods => "Rising three methods", FixedPercent(5.0), Up, NONE;
    ShootingStar => "Shooting star", FixedPercent(3.0), Down, NONE;
    SpinningTop => "Spinning top", FixedPercent(3.0), Either, NONE;
    ThreeBlackCrows => "Three black crows", FixedPercent(5.0), Down, NONE;
    ThreeInsideDown => "Three inside down", FixedPercent(4.0), Down, NONE;
    ThreeInsideUp => "Three inside up", FixedPercent(4.0), Up, NONE;
    ThreeOutsideDown => "Three outside down", FixedPercent(4.0), Down, NONE;
    ThreeOutsideUp => "Three outside up", FixedPercent(4.0), Up, NONE;
    ThreeWhiteSoldiers => "Three white soldiers", FixedPercent(5.0), Up, NONE;
    TweezersBottom => "Tweezers bottom", FixedPercent(3.0), Up, NONE;
    TweezersTop => "Tweezers top", FixedPercent(3.0), Down, NONE;
}

static BY_NAME: Lazy<HashMap<String, PatternType>> = Lazy::new(|| {
    PatternType::ALL
        .iter()
        .map(|&t| (t.name().to_ascii_lowercase(), t))
        .collect()
});

impl PatternType {
    pub fn all() -> &'static [PatternType] {
        Self::ALL
    }

    /// Whether the type ever classifies tall or short
    pub fn is_classifiable(self) -> bool {
        self.height_thresholds().is_some()
    }
}

impl fmt::Display for PatternType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for PatternType {
    type Err = Error;

    /// Parse a display name, ignoring case
    fn from_str(s: &str) -> Result<Self> {
        BY_NAME
            .get(&s.trim().to_ascii_lowercase())
            .copied()
            .ok_or_else(|| Error::UnknownPattern(s.to_string()))
    }
}
