//! Variable rendering: turns a raw CRM field value into the ordered variable
//! slots a message template expects.
//!
//! Every template is bound to one [`RenderRule`]. Rules are pure functions of
//! the raw string; they never touch the network or the catalog.

use std::collections::BTreeMap;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::de::{Deserializer, Error as _};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use thiserror::Error;

const CURRENCY_SYMBOLS: &[char] =
    &['$', '£', '€', '¥', '₹', '₦', '₩', '₽', '₺', '₪', '₱', '₫', '₴', '₵', '₸', '¢', '﷼'];

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RenderRule {
    /// Template has no variables.
    None,
    /// `{1}` is the first token, `{2}` the remainder.
    FirstWordRest,
    /// Six currency letters rendered as `{1}` base, `{2}` quote, `{3}` base.
    CurrencyPair,
    /// Amount, currency code and numeric reference.
    AmountCurrencyId,
    /// Forwarded to the quote service instead of the messaging provider.
    QuoteForward,
    /// The whole value lands in `{1}`.
    #[default]
    Whole,
}

impl RenderRule {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::FirstWordRest => "first_word_rest",
            Self::CurrencyPair => "currency_pair",
            Self::AmountCurrencyId => "amount_currency_id",
            Self::QuoteForward => "quote_forward",
            Self::Whole => "whole",
        }
    }

    pub fn render(self, template: &str, raw: &str) -> Result<Rendered, RenderError> {
        let raw = raw.trim();
        let rendered = match self {
            Self::None => Ok(Rendered::Variables(VariableSlots::default())),
            Self::FirstWordRest => Ok(Rendered::Variables(first_word_rest(raw))),
            Self::CurrencyPair => currency_pair(raw).map(Rendered::Variables),
            Self::AmountCurrencyId => amount_currency_id(raw).map(Rendered::Variables),
            Self::QuoteForward => quote_terms(raw).map(Rendered::Quote),
            Self::Whole => Ok(Rendered::Variables(VariableSlots::new(vec![raw.to_owned()]))),
        };

        rendered.map_err(|reason| RenderError::new(template, raw, reason))
    }
}

impl std::fmt::Display for RenderRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for RenderRule {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase().replace(['-', ' '], "_");
        match normalized.as_str() {
            "none" => Ok(Self::None),
            "first_word_rest" => Ok(Self::FirstWordRest),
            "currency_pair" => Ok(Self::CurrencyPair),
            "amount_currency_id" => Ok(Self::AmountCurrencyId),
            "quote_forward" => Ok(Self::QuoteForward),
            "whole" => Ok(Self::Whole),
            other => Err(format!(
                "unsupported render rule `{other}` (expected none|first_word_rest|currency_pair|\
                 amount_currency_id|quote_forward|whole)"
            )),
        }
    }
}

// Config files accept the same spellings as the command line.
impl<'de> Deserialize<'de> for RenderRule {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        value.parse().map_err(D::Error::custom)
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq, Serialize)]
#[error("could not parse `{raw}` for template `{template}`: {reason}")]
pub struct RenderError {
    pub template: String,
    pub raw: String,
    pub reason: String,
}

impl RenderError {
    pub fn new(
        template: impl Into<String>,
        raw: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self { template: template.into(), raw: raw.into(), reason: reason.into() }
    }
}

/// Output of a successful render.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Rendered {
    Variables(VariableSlots),
    Quote(QuoteTerms),
}

/// Ordered template variables. Slot ordinals start at 1.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct VariableSlots(Vec<String>);

impl VariableSlots {
    pub fn new(values: Vec<String>) -> Self {
        Self(values)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, ordinal: usize) -> Option<&str> {
        ordinal.checked_sub(1).and_then(|index| self.0.get(index)).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &str)> {
        self.0.iter().enumerate().map(|(index, value)| (index + 1, value.as_str()))
    }

    pub fn to_map(&self) -> BTreeMap<String, String> {
        self.iter().map(|(ordinal, value)| (ordinal.to_string(), value.to_owned())).collect()
    }
}

impl Serialize for VariableSlots {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(self.iter().map(|(ordinal, value)| (ordinal.to_string(), value)))
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct QuoteTerms {
    pub pair: String,
    pub direction: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
}

fn first_word_rest(raw: &str) -> VariableSlots {
    let (first, rest) = match raw.split_once(char::is_whitespace) {
        Some((first, rest)) => (first, rest.trim()),
        None => (raw, ""),
    };
    VariableSlots::new(vec![first.to_owned(), rest.to_owned()])
}

fn currency_pair(raw: &str) -> Result<VariableSlots, String> {
    let letters: String =
        raw.chars().filter(char::is_ascii_alphabetic).map(|ch| ch.to_ascii_uppercase()).collect();
    if letters.len() != 6 {
        return Err(format!(
            "currency pair needs exactly 6 letters, found {} (`{letters}`)",
            letters.len()
        ));
    }

    let (base, quote) = letters.split_at(3);
    Ok(VariableSlots::new(vec![base.to_owned(), quote.to_owned(), base.to_owned()]))
}

fn amount_currency_id(raw: &str) -> Result<VariableSlots, String> {
    let tokens: Vec<&str> = if raw.contains('|') {
        raw.split('|').map(str::trim).collect()
    } else {
        raw.split_whitespace().collect()
    };
    if tokens.len() < 3 {
        return Err(format!("expected amount, currency and id, found {} part(s)", tokens.len()));
    }

    let (amount, _) = normalize_amount(tokens[0])?;

    let currency = tokens[1].to_uppercase();
    if currency.is_empty() {
        return Err("currency is empty".to_owned());
    }

    let id = tokens[2];
    if id.is_empty() || !id.chars().all(|ch| ch.is_ascii_digit()) {
        return Err(format!("id `{id}` must be all digits"));
    }

    Ok(VariableSlots::new(vec![amount, currency, id.to_owned()]))
}

fn quote_terms(raw: &str) -> Result<QuoteTerms, String> {
    let tokens: Vec<&str> = raw.split_whitespace().collect();
    let [pair, direction, amount] = tokens.as_slice() else {
        return Err(format!(
            "expected `<pair> <direction> <amount>`, found {} part(s)",
            tokens.len()
        ));
    };

    let (_, amount) = normalize_amount(amount)?;
    Ok(QuoteTerms { pair: (*pair).to_owned(), direction: (*direction).to_owned(), amount })
}

/// Strips currency symbols, thousands separators and whitespace, then checks
/// the rest is a decimal number. Returns the normalized text and its value.
fn normalize_amount(token: &str) -> Result<(String, Decimal), String> {
    let stripped: String = token
        .chars()
        .filter(|ch| !CURRENCY_SYMBOLS.contains(ch) && *ch != ',' && !ch.is_whitespace())
        .collect();
    if stripped.is_empty() {
        return Err(format!("amount `{token}` is empty after stripping symbols"));
    }

    let value = Decimal::from_str(&stripped)
        .map_err(|_| format!("amount `{token}` is not a decimal number"))?;
    Ok((stripped, value))
}
