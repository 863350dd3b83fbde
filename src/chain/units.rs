//! 原始整数数量与人类可读单位之间的纯函数换算。

use alloy_primitives::U256;
use rust_decimal::Decimal;

/// 将原始单位数量格式化为十进制字符串，如 1_500_000_000 (9 位精度) -> "1.5"。
pub fn format_units(amount: U256, decimals: u8) -> String {
    let raw = amount.to_string();
    if decimals == 0 {
        return raw;
    }
    let decimals = decimals as usize;
    let padded = if raw.len() <= decimals {
        format!("{raw:0>width$}", width = decimals + 1)
    } else {
        raw
    };
    let split = padded.len() - decimals;
    let (int_part, frac_part) = padded.split_at(split);
    let frac_part = frac_part.trim_end_matches('0');
    if frac_part.is_empty() {
        int_part.to_string()
    } else {
        format!("{int_part}.{frac_part}")
    }
}

/// 将十进制字符串解析为原始单位数量，超出精度的尾数拒绝而不是静默截断。
pub fn parse_units(text: &str, decimals: u8) -> Result<U256, String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err("empty amount".to_string());
    }
    let (int_part, frac_part) = match trimmed.split_once('.') {
        Some((int_part, frac_part)) => (int_part, frac_part),
        None => (trimmed, ""),
    };
    if int_part.is_empty() && frac_part.is_empty() {
        return Err(format!("invalid amount: {text}"));
    }
    if !int_part.chars().all(|digit| digit.is_ascii_digit())
        || !frac_part.chars().all(|digit| digit.is_ascii_digit())
    {
        return Err(format!("invalid amount: {text}"));
    }
    let frac_trimmed = frac_part.trim_end_matches('0');
    if frac_trimmed.len() > decimals as usize {
        return Err(format!(
            "amount {text} has more than {decimals} fractional digits"
        ));
    }
    let mut digits = String::with_capacity(int_part.len() + decimals as usize);
    digits.push_str(int_part);
    digits.push_str(frac_trimmed);
    for _ in frac_trimmed.len()..decimals as usize {
        digits.push('0');
    }
    let digits = digits.trim_start_matches('0');
    if digits.is_empty() {
        return Ok(U256::ZERO);
    }
    digits
        .parse::<U256>()
        .map_err(|err| format!("amount {text} out of range: {err}"))
}

/// Decimal 尾数上限（96 位）。
const DECIMAL_MANTISSA_MAX: u128 = 79_228_162_514_264_337_593_543_950_335;

/// 将原始数量折算为 Decimal，超出 Decimal 可表示范围时返回 None。
pub fn decimal_amount(amount: U256, decimals: u8) -> Option<Decimal> {
    let mut value = amount;
    let mut scale = u32::from(decimals);
    // Decimal 尾数只有 96 位、小数位最多 28 位，超出时截掉低位再折算。
    while value > U256::from(DECIMAL_MANTISSA_MAX) || scale > 28 {
        if scale == 0 {
            return None;
        }
        value /= U256::from(10u64);
        scale -= 1;
    }
    let mantissa = i128::try_from(value.to::<u128>()).ok()?;
    Decimal::try_from_i128_with_scale(mantissa, scale).ok()
}

/// 推导成交汇率（输出/输入），两侧都按各自精度折算。
pub fn derive_rate(
    amount_in: U256,
    in_decimals: u8,
    amount_out: U256,
    out_decimals: u8,
) -> Option<Decimal> {
    let input = decimal_amount(amount_in, in_decimals)?;
    let output = decimal_amount(amount_out, out_decimals)?;
    if input.is_zero() {
        return None;
    }
    output.checked_div(input)
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    #[test]
    fn format_whole_and_fractional() {
        assert_eq!(format_units(U256::from(1_500_000_000u64), 9), "1.5");
        assert_eq!(format_units(U256::from(42u64), 0), "42");
        assert_eq!(format_units(U256::ZERO, 18), "0");
        assert_eq!(format_units(U256::from(1u64), 9), "0.000000001");
    }

    #[test]
    fn parse_round_trips_format() {
        for (raw, decimals) in [
            (1_500_000_000u64, 9u8),
            (1u64, 18),
            (123_456_789u64, 6),
            (0u64, 8),
        ] {
            let amount = U256::from(raw);
            let formatted = format_units(amount, decimals);
            assert_eq!(parse_units(&formatted, decimals), Ok(amount));
        }
    }

    #[test]
    fn parse_rejects_excess_precision() {
        assert!(parse_units("1.0000000001", 9).is_err());
        // 尾随零不计入精度
        assert_eq!(
            parse_units("1.1000000000", 9),
            Ok(U256::from(1_100_000_000u64))
        );
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(parse_units("", 9).is_err());
        assert!(parse_units(".", 9).is_err());
        assert!(parse_units("1,5", 9).is_err());
        assert!(parse_units("-1", 9).is_err());
    }

    #[test]
    fn rate_uses_both_decimals() {
        // 1.0 (9 位) 换 2000.0 (6 位) => 汇率 2000
        let rate = derive_rate(
            U256::from(1_000_000_000u64),
            9,
            U256::from(2_000_000_000u64),
            6,
        )
        .expect("rate");
        assert_eq!(rate, Decimal::from_str("2000").unwrap());
    }

    #[test]
    fn rate_for_zero_input_is_none() {
        assert_eq!(derive_rate(U256::ZERO, 9, U256::from(1u64), 9), None);
    }

    #[test]
    fn decimal_amount_truncates_oversized_mantissa() {
        // 远超 96 位尾数的数值仍应得到近似的 Decimal 而不是 panic
        let huge = U256::from_str("123456789012345678901234567890123456789").unwrap();
        let approx = decimal_amount(huge, 18).expect("approximated decimal");
        assert!(approx > Decimal::ZERO);
    }
}
