use crate::core::errors::ExchangeError;
use std::fmt;
use std::time::Duration;

/// Name of one logical stream, e.g. `btcusdt@depth20@100ms`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StreamName(String);

impl StreamName {
    /// `lowercase(symbol)@stream` followed by an optional qualifier
    pub fn new(symbol: &str, stream: &str, qualifier: &str) -> Self {
        Self(format!("{}@{}{}", symbol.to_lowercase(), stream, qualifier))
    }

    /// A stream that is not tied to a symbol (`!markPrice@arr`, listen keys)
    pub fn raw(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Symbol prefix of the name, uppercased
    pub fn symbol(&self) -> Option<String> {
        symbol_from_stream(&self.0)
    }
}

impl fmt::Display for StreamName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for StreamName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Extract the symbol part of a `<symbol>@<name>` stream identifier
pub fn symbol_from_stream(stream: &str) -> Option<String> {
    let (symbol, _) = stream.split_once('@')?;
    if symbol.is_empty() || symbol.starts_with('!') {
        return None;
    }
    Some(symbol.to_uppercase())
}

/// Base URLs for raw and combined streams of one environment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamEndpoints {
    /// e.g. `wss://fstream.binance.com/ws`
    pub base: String,
    /// e.g. `wss://fstream.binance.com/stream?streams=`
    pub combined_base: String,
}

impl StreamEndpoints {
    pub fn new(base: impl Into<String>, combined_base: impl Into<String>) -> Self {
        Self {
            base: base.into(),
            combined_base: combined_base.into(),
        }
    }

    /// URL of a single raw stream
    pub fn single(&self, stream: &StreamName) -> String {
        format!("{}/{}", self.base, stream)
    }

    /// URL of a combined stream; names keep their order
    pub fn combined(&self, streams: &[StreamName]) -> Result<String, ExchangeError> {
        if streams.is_empty() {
            return Err(ExchangeError::InvalidParameters(
                "A combined stream needs at least one stream name".to_string(),
            ));
        }
        let names: Vec<&str> = streams.iter().map(StreamName::as_str).collect();
        Ok(format!("{}{}", self.combined_base, names.join("/")))
    }
}

/// Partial book depth levels accepted by the exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DepthLevels {
    Five,
    Ten,
    Twenty,
}

impl DepthLevels {
    pub fn as_qualifier(self) -> &'static str {
        match self {
            Self::Five => "5",
            Self::Ten => "10",
            Self::Twenty => "20",
        }
    }
}

impl TryFrom<u32> for DepthLevels {
    type Error = ExchangeError;

    fn try_from(levels: u32) -> Result<Self, Self::Error> {
        match levels {
            5 => Ok(Self::Five),
            10 => Ok(Self::Ten),
            20 => Ok(Self::Twenty),
            other => Err(ExchangeError::InvalidParameters(format!(
                "Invalid depth levels {}: expected 5, 10 or 20",
                other
            ))),
        }
    }
}

/// Depth stream update speed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DepthUpdateSpeed {
    #[default]
    Ms250,
    Ms500,
    Ms100,
}

impl DepthUpdateSpeed {
    pub fn as_qualifier(self) -> &'static str {
        match self {
            Self::Ms250 => "",
            Self::Ms500 => "@500ms",
            Self::Ms100 => "@100ms",
        }
    }
}

impl TryFrom<Duration> for DepthUpdateSpeed {
    type Error = ExchangeError;

    fn try_from(rate: Duration) -> Result<Self, Self::Error> {
        match rate.as_millis() {
            250 => Ok(Self::Ms250),
            500 => Ok(Self::Ms500),
            100 => Ok(Self::Ms100),
            other => Err(ExchangeError::InvalidParameters(format!(
                "Invalid depth update speed {}ms: expected 100, 250 or 500",
                other
            ))),
        }
    }
}

/// Mark price stream update rate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MarkPriceRate {
    #[default]
    ThreeSeconds,
    OneSecond,
}

impl MarkPriceRate {
    pub fn as_qualifier(self) -> &'static str {
        match self {
            Self::ThreeSeconds => "",
            Self::OneSecond => "@1s",
        }
    }
}

impl TryFrom<Duration> for MarkPriceRate {
    type Error = ExchangeError;

    fn try_from(rate: Duration) -> Result<Self, Self::Error> {
        match rate.as_millis() {
            3000 => Ok(Self::ThreeSeconds),
            1000 => Ok(Self::OneSecond),
            other => Err(ExchangeError::InvalidParameters(format!(
                "Invalid mark price rate {}ms: expected 1000 or 3000",
                other
            ))),
        }
    }
}

/// Kline/candlestick intervals
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KlineInterval {
    Seconds1,
    Minutes1,
    Minutes3,
    Minutes5,
    Minutes15,
    Minutes30,
    Hours1,
    Hours2,
    Hours4,
    Hours6,
    Hours8,
    Hours12,
    Days1,
    Days3,
    Weeks1,
    Months1,
}

impl KlineInterval {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Seconds1 => "1s",
            Self::Minutes1 => "1m",
            Self::Minutes3 => "3m",
            Self::Minutes5 => "5m",
            Self::Minutes15 => "15m",
            Self::Minutes30 => "30m",
            Self::Hours1 => "1h",
            Self::Hours2 => "2h",
            Self::Hours4 => "4h",
            Self::Hours6 => "6h",
            Self::Hours8 => "8h",
            Self::Hours12 => "12h",
            Self::Days1 => "1d",
            Self::Days3 => "3d",
            Self::Weeks1 => "1w",
            Self::Months1 => "1M",
        }
    }
}

impl std::str::FromStr for KlineInterval {
    type Err = ExchangeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let interval = match s {
            "1s" => Self::Seconds1,
            "1m" => Self::Minutes1,
            "3m" => Self::Minutes3,
            "5m" => Self::Minutes5,
            "15m" => Self::Minutes15,
            "30m" => Self::Minutes30,
            "1h" => Self::Hours1,
            "2h" => Self::Hours2,
            "4h" => Self::Hours4,
            "6h" => Self::Hours6,
            "8h" => Self::Hours8,
            "12h" => Self::Hours12,
            "1d" => Self::Days1,
            "3d" => Self::Days3,
            "1w" => Self::Weeks1,
            "1M" => Self::Months1,
            other => {
                return Err(ExchangeError::InvalidParameters(format!(
                    "Unsupported kline interval '{}'",
                    other
                )))
            }
        };
        Ok(interval)
    }
}

impl fmt::Display for KlineInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
