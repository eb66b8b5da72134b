//! Display formatting for values substituted into contracts (pt-BR).

use chrono::NaiveDate;
use rust_decimal::{Decimal, RoundingStrategy};

/// `3500.5` → `R$ 3.500,50`
pub fn brl(value: Decimal) -> String {
    let rounded = value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    let negative = rounded.is_sign_negative() && !rounded.is_zero();
    let text = format!("{:.2}", rounded.abs());
    let (int_part, frac_part) = text.split_once('.').unwrap_or((text.as_str(), "00"));

    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (i, ch) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push('.');
        }
        grouped.push(ch);
    }

    let sign = if negative { "-" } else { "" };
    format!("{sign}R$ {grouped},{frac_part}")
}

/// `2024-03-01` → `01/03/2024`
pub fn date_br(date: NaiveDate) -> String {
    date.format("%d/%m/%Y").to_string()
}

/// Mask an 11-digit CPF or 14-digit CNPJ. Anything else is returned trimmed,
/// since validation belongs to an external service.
pub fn tax_id(raw: &str) -> String {
    let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
    match digits.len() {
        11 => format!(
            "{}.{}.{}-{}",
            &digits[0..3],
            &digits[3..6],
            &digits[6..9],
            &digits[9..11]
        ),
        14 => format!(
            "{}.{}.{}/{}-{}",
            &digits[0..2],
            &digits[2..5],
            &digits[5..8],
            &digits[8..12],
            &digits[12..14]
        ),
        _ => raw.trim().to_string(),
    }
}

/// `01310100` → `01310-100`
pub fn postal_code(raw: &str) -> String {
    let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
    if digits.len() == 8 {
        format!("{}-{}", &digits[0..5], &digits[5..8])
    } else {
        raw.trim().to_string()
    }
}
