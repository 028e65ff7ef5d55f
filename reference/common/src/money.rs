//! Fixed-point monetary types for SwapSettle.
//!
//! An amount is an integer count of minor units at an explicit scale, so no
//! binary floating point ever touches a balance. Arithmetic between two
//! amounts requires the same currency and scale.
//!
//! Rounding happens in exactly one helper, [`div_round_half_down`], reached
//! through [`Money::rescale`] and the rate operations built on it. Values
//! round to the nearest minor unit and an exact tie rounds toward zero, so
//! a result can land above the exact value by at most half a unit.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use thiserror::Error;

/// Errors from fixed-point arithmetic and parsing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MoneyError {
    /// Input carries more fractional digits than the target scale.
    #[error("Precision overflow: provided {provided} decimals, max allowed {max}")]
    PrecisionOverflow { provided: u32, max: u32 },

    /// Input is not a plain decimal number.
    #[error("Invalid amount format: {0}")]
    InvalidFormat(String),

    /// Result does not fit in the minor-unit range.
    #[error("Amount overflow")]
    Overflow,

    /// Operands are in different currencies.
    #[error("Currency mismatch: expected {expected}, got {actual}")]
    CurrencyMismatch { expected: Currency, actual: Currency },

    /// Operands are at different scales.
    #[error("Scale mismatch: expected {expected}, got {actual}")]
    ScaleMismatch { expected: u32, actual: u32 },

    /// Division by a zero rate.
    #[error("Division by zero")]
    DivisionByZero,
}

/// Result type for money operations.
pub type MoneyResult<T> = Result<T, MoneyError>;

fn pow10(exp: u32) -> MoneyResult<i128> {
    10i128.checked_pow(exp).ok_or(MoneyError::Overflow)
}

/// Divides and rounds half-down on the magnitude: a remainder of exactly
/// half stays on the smaller side.
fn div_round_half_down(numerator: i128, denominator: i128) -> MoneyResult<i128> {
    if denominator == 0 {
        return Err(MoneyError::DivisionByZero);
    }

    let negative = (numerator < 0) != (denominator < 0);
    let n = numerator.checked_abs().ok_or(MoneyError::Overflow)?;
    let d = denominator.checked_abs().ok_or(MoneyError::Overflow)?;

    let mut quotient = n / d;
    let remainder = n % d;
    if remainder > d - remainder {
        quotient += 1;
    }

    Ok(if negative { -quotient } else { quotient })
}

/// A monetary amount in integer minor units.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "MoneyRepr", into = "MoneyRepr")]
pub struct Money {
    minor_units: i128,
    scale: u32,
    currency: Currency,
}

impl Money {
    /// Create from raw minor units at the given scale.
    pub fn from_minor(minor_units: i128, currency: Currency, scale: u32) -> Self {
        Self {
            minor_units,
            scale,
            currency,
        }
    }

    /// Create from minor units at the currency's native scale.
    pub fn native(minor_units: i128, currency: Currency) -> Self {
        let scale = currency.scale();
        Self::from_minor(minor_units, currency, scale)
    }

    /// A zero amount.
    pub fn zero(currency: Currency, scale: u32) -> Self {
        Self::from_minor(0, currency, scale)
    }

    /// Parse a decimal string at a fixed scale.
    ///
    /// Rejects anything that is not `[-]digits[.digits]`, and rejects
    /// significant fractional digits beyond `scale` instead of truncating.
    pub fn parse(input: &str, currency: Currency, scale: u32) -> MoneyResult<Self> {
        let input = input.trim();
        let (negative, digits) = match input.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, input),
        };

        if digits.is_empty() {
            return Err(MoneyError::InvalidFormat("empty amount".into()));
        }

        let (whole, frac) = match digits.split_once('.') {
            Some((whole, frac)) => {
                if whole.is_empty() || frac.is_empty() {
                    return Err(MoneyError::InvalidFormat(format!(
                        "incomplete decimal '{}'",
                        input
                    )));
                }
                (whole, frac)
            }
            None => (digits, ""),
        };

        let all_digits = |s: &str| s.bytes().all(|b| b.is_ascii_digit());
        if !all_digits(whole) || !all_digits(frac) {
            return Err(MoneyError::InvalidFormat(format!(
                "invalid character in '{}'",
                input
            )));
        }

        let frac = frac.trim_end_matches('0');
        if frac.len() > scale as usize {
            return Err(MoneyError::PrecisionOverflow {
                provided: frac.len() as u32,
                max: scale,
            });
        }

        let whole_units: i128 = whole.parse().map_err(|_| MoneyError::Overflow)?;
        let frac_units: i128 = if frac.is_empty() {
            0
        } else {
            format!("{:0<width$}", frac, width = scale as usize)
                .parse()
                .map_err(|_| MoneyError::Overflow)?
        };

        let magnitude = whole_units
            .checked_mul(pow10(scale)?)
            .and_then(|v| v.checked_add(frac_units))
            .ok_or(MoneyError::Overflow)?;

        Ok(Self::from_minor(
            if negative { -magnitude } else { magnitude },
            currency,
            scale,
        ))
    }

    /// Convert a `Decimal` at a fixed scale, with the same strictness as [`Money::parse`].
    pub fn from_decimal(value: Decimal, currency: Currency, scale: u32) -> MoneyResult<Self> {
        let value = value.normalize();
        if value.scale() > scale {
            return Err(MoneyError::PrecisionOverflow {
                provided: value.scale(),
                max: scale,
            });
        }

        let minor_units = value
            .mantissa()
            .checked_mul(pow10(scale - value.scale())?)
            .ok_or(MoneyError::Overflow)?;

        Ok(Self::from_minor(minor_units, currency, scale))
    }

    /// Integer minor units.
    pub fn minor_units(&self) -> i128 {
        self.minor_units
    }

    /// Number of fractional digits represented.
    pub fn scale(&self) -> u32 {
        self.scale
    }

    /// Currency of the amount.
    pub fn currency(&self) -> &Currency {
        &self.currency
    }

    /// Exact decimal view, for display and wire formats only.
    pub fn to_decimal(&self) -> MoneyResult<Decimal> {
        Decimal::try_from_i128_with_scale(self.minor_units, self.scale)
            .map_err(|_| MoneyError::Overflow)
    }

    /// Check if the amount is positive.
    pub fn is_positive(&self) -> bool {
        self.minor_units > 0
    }

    /// Check if the amount is zero.
    pub fn is_zero(&self) -> bool {
        self.minor_units == 0
    }

    /// Check if the amount is negative.
    pub fn is_negative(&self) -> bool {
        self.minor_units < 0
    }

    fn ensure_compatible(&self, other: &Money) -> MoneyResult<()> {
        if self.currency != other.currency {
            return Err(MoneyError::CurrencyMismatch {
                expected: self.currency.clone(),
                actual: other.currency.clone(),
            });
        }
        if self.scale != other.scale {
            return Err(MoneyError::ScaleMismatch {
                expected: self.scale,
                actual: other.scale,
            });
        }
        Ok(())
    }

    /// Add two amounts of the same currency and scale.
    pub fn checked_add(&self, other: &Money) -> MoneyResult<Money> {
        self.ensure_compatible(other)?;
        let minor_units = self
            .minor_units
            .checked_add(other.minor_units)
            .ok_or(MoneyError::Overflow)?;
        Ok(Self::from_minor(minor_units, self.currency.clone(), self.scale))
    }

    /// Subtract two amounts of the same currency and scale.
    pub fn checked_sub(&self, other: &Money) -> MoneyResult<Money> {
        self.ensure_compatible(other)?;
        let minor_units = self
            .minor_units
            .checked_sub(other.minor_units)
            .ok_or(MoneyError::Overflow)?;
        Ok(Self::from_minor(minor_units, self.currency.clone(), self.scale))
    }

    /// Order two amounts of the same currency and scale.
    pub fn compare(&self, other: &Money) -> MoneyResult<Ordering> {
        self.ensure_compatible(other)?;
        Ok(self.minor_units.cmp(&other.minor_units))
    }

    /// Convert to another scale.
    ///
    /// Upscaling is exact. Downscaling rounds half-down.
    pub fn rescale(&self, scale: u32) -> MoneyResult<Money> {
        let minor_units = match scale.cmp(&self.scale) {
            Ordering::Equal => self.minor_units,
            Ordering::Greater => self
                .minor_units
                .checked_mul(pow10(scale - self.scale)?)
                .ok_or(MoneyError::Overflow)?,
            Ordering::Less => div_round_half_down(self.minor_units, pow10(self.scale - scale)?)?,
        };
        Ok(Self::from_minor(minor_units, self.currency.clone(), scale))
    }

    /// Convert to another scale, failing rather than rounding.
    pub fn rescale_exact(&self, scale: u32) -> MoneyResult<Money> {
        if scale < self.scale {
            let divisor = pow10(self.scale - scale)?;
            if self.minor_units % divisor != 0 {
                return Err(MoneyError::PrecisionOverflow {
                    provided: self.significant_scale(),
                    max: scale,
                });
            }
        }
        self.rescale(scale)
    }

    fn significant_scale(&self) -> u32 {
        let mut units = self.minor_units;
        let mut scale = self.scale;
        while scale > 0 && units % 10 == 0 {
            units /= 10;
            scale -= 1;
        }
        scale
    }

    /// Multiply by a rate into `currency` at `scale`, rounding once.
    pub fn mul_rate(&self, rate: Decimal, currency: Currency, scale: u32) -> MoneyResult<Money> {
        let rate = rate.normalize();
        let product = self
            .minor_units
            .checked_mul(rate.mantissa())
            .ok_or(MoneyError::Overflow)?;
        Money::from_minor(product, currency, self.scale + rate.scale()).rescale(scale)
    }

    /// Divide by a rate into `currency` at `scale`, rounding once.
    pub fn div_rate(&self, rate: Decimal, currency: Currency, scale: u32) -> MoneyResult<Money> {
        let rate = rate.normalize();
        if rate.is_zero() {
            return Err(MoneyError::DivisionByZero);
        }

        let numerator = self
            .minor_units
            .checked_mul(pow10(scale + rate.scale())?)
            .ok_or(MoneyError::Overflow)?;
        let denominator = rate
            .mantissa()
            .checked_mul(pow10(self.scale)?)
            .ok_or(MoneyError::Overflow)?;

        Ok(Money::from_minor(
            div_round_half_down(numerator, denominator)?,
            currency,
            scale,
        ))
    }

    /// A fraction of this amount in the same currency and scale (fees).
    pub fn percent(&self, rate: Decimal) -> MoneyResult<Money> {
        self.mul_rate(rate, self.currency.clone(), self.scale)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.minor_units < 0 { "-" } else { "" };
        let magnitude = self.minor_units.unsigned_abs();

        if self.scale == 0 {
            return write!(f, "{}{}", sign, magnitude);
        }

        match 10u128.checked_pow(self.scale) {
            Some(divisor) => write!(
                f,
                "{}{}.{:0width$}",
                sign,
                magnitude / divisor,
                magnitude % divisor,
                width = self.scale as usize
            ),
            None => write!(f, "{}{}e-{}", sign, magnitude, self.scale),
        }
    }
}

#[derive(Serialize, Deserialize)]
struct MoneyRepr {
    amount: String,
    currency: Currency,
    scale: u32,
}

impl From<Money> for MoneyRepr {
    fn from(money: Money) -> Self {
        Self {
            amount: money.to_string(),
            scale: money.scale,
            currency: money.currency,
        }
    }
}

impl TryFrom<MoneyRepr> for Money {
    type Error = MoneyError;

    fn try_from(repr: MoneyRepr) -> Result<Self, Self::Error> {
        Money::parse(&repr.amount, repr.currency, repr.scale)
    }
}

/// Whether an asset is a fiat currency or a crypto asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetKind {
    Fiat,
    Crypto,
}

const CRYPTO_ASSETS: &[&str] = &[
    "BTC", "ETH", "USDT", "USDC", "BNB", "SOL", "LTC", "TRX", "XRP", "DOGE", "DASH", "BCH",
    "MATIC", "CAKE", "SHIB", "ADA", "DOT", "LINK", "XLM",
];

/// Upper-cased asset code.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct Currency(String);

impl Currency {
    /// Create a new currency from code.
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into().trim().to_uppercase())
    }

    /// Get the currency code.
    pub fn code(&self) -> &str {
        &self.0
    }

    /// Fiat or crypto.
    pub fn kind(&self) -> AssetKind {
        if CRYPTO_ASSETS.contains(&self.0.as_str()) {
            AssetKind::Crypto
        } else {
            AssetKind::Fiat
        }
    }

    /// Whether this is a fiat currency.
    pub fn is_fiat(&self) -> bool {
        self.kind() == AssetKind::Fiat
    }

    /// Native number of fractional digits.
    pub fn scale(&self) -> u32 {
        match self.kind() {
            AssetKind::Crypto => 8,
            AssetKind::Fiat => match self.0.as_str() {
                "JPY" | "KRW" | "VND" | "XOF" | "XAF" => 0,
                "BHD" | "KWD" | "OMR" => 3,
                _ => 2,
            },
        }
    }

    /// Common currencies
    pub fn ngn() -> Self {
        Self::new("NGN")
    }

    pub fn usd() -> Self {
        Self::new("USD")
    }

    pub fn btc() -> Self {
        Self::new("BTC")
    }

    pub fn eth() -> Self {
        Self::new("ETH")
    }

    pub fn usdt() -> Self {
        Self::new("USDT")
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Currency {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Currency {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<Currency> for String {
    fn from(currency: Currency) -> Self {
        currency.0
    }
}

/// A market: `price` is counter units per one base unit.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CurrencyPair {
    /// Asset being priced.
    pub base: Currency,
    /// Pricing currency.
    pub counter: Currency,
}

impl CurrencyPair {
    /// Create a new currency pair.
    pub fn new(base: Currency, counter: Currency) -> Self {
        Self { base, counter }
    }

    /// Provider market symbol, e.g. `btcngn`.
    pub fn market_symbol(&self) -> String {
        format!("{}{}", self.base.code(), self.counter.code()).to_lowercase()
    }
}

impl fmt::Display for CurrencyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.base, self.counter)
    }
}

/// A market price observed from a provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FxRate {
    /// The market.
    pub pair: CurrencyPair,
    /// Counter units per base unit.
    pub price: Decimal,
    /// When the price was observed.
    pub quoted_at: chrono::DateTime<chrono::Utc>,
    /// Rate source name.
    pub source: String,
}

impl FxRate {
    /// Create a new rate.
    pub fn new(
        pair: CurrencyPair,
        price: Decimal,
        quoted_at: chrono::DateTime<chrono::Utc>,
        source: impl Into<String>,
    ) -> Self {
        Self {
            pair,
            price,
            quoted_at,
            source: source.into(),
        }
    }

    /// Only strictly positive prices are usable.
    pub fn is_usable(&self) -> bool {
        self.price > Decimal::ZERO
    }
}
