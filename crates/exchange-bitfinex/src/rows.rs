//! Decoding of Bitfinex array rows into records.
//!
//! Row layouts:
//! - candles: `[MTS, OPEN, CLOSE, HIGH, LOW, VOLUME]`
//! - trades: `[ID, MTS, AMOUNT, PRICE]`
//! - funding trades: `[ID, MTS, AMOUNT, RATE, PERIOD]`

use chrono::{DateTime, TimeZone, Utc};
use harvest_data::{CandleRecord, FundingTradeRecord, TradeRecord};
use rust_decimal::Decimal;
use serde_json::Value;
use std::str::FromStr;

/// Parses a decimal from a JSON number or string, accepting exponent notation.
pub(crate) fn parse_decimal(value: &Value) -> Option<Decimal> {
    let text = match value {
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.trim().to_string(),
        _ => return None,
    };
    Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .ok()
}

pub(crate) fn parse_millis(value: &Value) -> Option<DateTime<Utc>> {
    let millis = value.as_i64()?;
    Utc.timestamp_millis_opt(millis).single()
}

pub(crate) fn candle(symbol: &str, row: &[Value]) -> Option<CandleRecord> {
    if row.len() < 6 {
        return None;
    }
    Some(CandleRecord {
        symbol: symbol.to_string(),
        time: parse_millis(&row[0])?,
        open: parse_decimal(&row[1])?,
        close: parse_decimal(&row[2])?,
        high: parse_decimal(&row[3])?,
        low: parse_decimal(&row[4])?,
        volume: parse_decimal(&row[5])?,
    })
}

pub(crate) fn trade(symbol: &str, row: &[Value]) -> Option<TradeRecord> {
    if row.len() < 4 {
        return None;
    }
    Some(TradeRecord {
        symbol: symbol.to_string(),
        id: row[0].as_i64()?,
        time: parse_millis(&row[1])?,
        amount: parse_decimal(&row[2])?,
        price: parse_decimal(&row[3])?,
    })
}

pub(crate) fn funding_trade(symbol: &str, row: &[Value]) -> Option<FundingTradeRecord> {
    if row.len() < 5 {
        return None;
    }
    Some(FundingTradeRecord {
        symbol: symbol.to_string(),
        id: row[0].as_i64()?,
        time: parse_millis(&row[1])?,
        amount: parse_decimal(&row[2])?,
        rate: parse_decimal(&row[3])?,
        period: i32::try_from(row[4].as_i64()?).ok()?,
    })
}

/// Decodes every row, dropping the ones that do not fit the layout.
pub(crate) fn decode_all<R>(
    symbol: &str,
    rows: Vec<Value>,
    decode: fn(&str, &[Value]) -> Option<R>,
) -> Vec<R> {
    rows.into_iter()
        .filter_map(|row| {
            let decoded = row.as_array().and_then(|fields| decode(symbol, fields));
            if decoded.is_none() {
                tracing::warn!(symbol, %row, "Skipping malformed row");
            }
            decoded
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    #[test]
    fn test_parse_decimal_forms() {
        assert_eq!(parse_decimal(&json!(62000.5)), Some(dec!(62000.5)));
        assert_eq!(parse_decimal(&json!("0.0002")), Some(dec!(0.0002)));
        assert_eq!(parse_decimal(&json!(-3)), Some(dec!(-3)));
        assert_eq!(parse_decimal(&json!(0.00001)), Some(dec!(0.00001)));
        assert_eq!(parse_decimal(&json!(null)), None);
    }

    #[test]
    fn test_candle_row() {
        let row = json!([1_709_251_200_000_i64, 62000, 62100, 62200.5, 61900, 12.5]);
        let c = candle("btcusd", row.as_array().unwrap()).unwrap();
        assert_eq!(c.time.to_rfc3339(), "2024-03-01T00:00:00+00:00");
        assert_eq!(c.open, dec!(62000));
        assert_eq!(c.close, dec!(62100));
        assert_eq!(c.high, dec!(62200.5));
        assert_eq!(c.low, dec!(61900));
        assert_eq!(c.volume, dec!(12.5));
    }

    #[test]
    fn test_trade_row_keeps_signed_amount() {
        let row = json!([401_597_395_i64, 1_709_251_200_250_i64, -0.25, 62000.1]);
        let t = trade("btcusd", row.as_array().unwrap()).unwrap();
        assert_eq!(t.id, 401_597_395);
        assert_eq!(t.amount, dec!(-0.25));
        assert_eq!(t.time.timestamp_subsec_millis(), 250);
    }

    #[test]
    fn test_funding_row() {
        let row = json!([12, 1_709_251_200_000_i64, 1500, 0.0002, 30]);
        let f = funding_trade("usd", row.as_array().unwrap()).unwrap();
        assert_eq!(f.rate, dec!(0.0002));
        assert_eq!(f.period, 30);
    }

    #[test]
    fn test_short_or_mistyped_rows_are_dropped() {
        let rows = vec![
            json!([1, 1_709_251_200_000_i64, 1.0]),
            json!("not a row"),
            json!([2, 1_709_251_200_000_i64, 1.0, 62000]),
        ];
        let trades = decode_all("btcusd", rows, trade);
        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0].id, 2);
    }
}
