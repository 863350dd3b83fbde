//! Venue API 通用的序列化辅助：上游普遍把大整数编码为字符串。

pub mod field_as_string {
    use std::str::FromStr;

    use serde::{Deserialize, Deserializer, Serialize, Serializer, de};

    pub fn serialize<T, S>(value: &T, serializer: S) -> Result<S::Ok, S::Error>
    where
        T: ToString,
        S: Serializer,
    {
        value.to_string().serialize(serializer)
    }

    pub fn deserialize<'de, T, D>(deserializer: D) -> Result<T, D::Error>
    where
        T: FromStr,
        T::Err: std::fmt::Debug,
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        raw.parse()
            .map_err(|err| de::Error::custom(format!("parse error: {err:?}")))
    }
}

pub mod option_field_as_string {
    use std::str::FromStr;

    use serde::{Deserialize, Deserializer, de};

    pub fn deserialize<'de, T, D>(deserializer: D) -> Result<Option<T>, D::Error>
    where
        T: FromStr,
        T::Err: std::fmt::Debug,
        D: Deserializer<'de>,
    {
        let raw = Option::<String>::deserialize(deserializer)?;
        match raw {
            None => Ok(None),
            Some(text) if text.is_empty() => Ok(None),
            Some(text) => text
                .parse()
                .map(Some)
                .map_err(|err| de::Error::custom(format!("parse error: {err:?}"))),
        }
    }
}

/// 有些接口把数字既可能给成字符串也可能给成 JSON number。
pub mod lenient_f64 {
    use serde::{Deserialize, Deserializer, de};
    use serde_json::Value;

    pub fn deserialize<'de, D>(deserializer: D) -> Result<f64, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Value::deserialize(deserializer)? {
            Value::Null => Ok(0.0),
            Value::Number(number) => Ok(number.as_f64().unwrap_or(0.0)),
            Value::String(text) if text.is_empty() => Ok(0.0),
            Value::String(text) => text
                .parse()
                .map_err(|err| de::Error::custom(format!("parse error: {err}"))),
            other => Err(de::Error::custom(format!(
                "expected number or string, got {other}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use alloy_primitives::U256;
    use serde::Deserialize;

    #[derive(Deserialize)]
    struct Sample {
        #[serde(with = "super::field_as_string")]
        amount: U256,
        #[serde(default, with = "super::option_field_as_string")]
        maybe: Option<u64>,
        #[serde(default, with = "super::lenient_f64")]
        impact: f64,
    }

    #[test]
    fn amounts_parse_from_strings() {
        let sample: Sample =
            serde_json::from_str(r#"{"amount":"123456789012345678901","maybe":"42","impact":"0.35"}"#)
                .expect("parse sample");
        assert_eq!(
            sample.amount,
            "123456789012345678901".parse::<U256>().unwrap()
        );
        assert_eq!(sample.maybe, Some(42));
        assert!((sample.impact - 0.35).abs() < f64::EPSILON);
    }

    #[test]
    fn lenient_f64_accepts_numbers_and_null() {
        let sample: Sample =
            serde_json::from_str(r#"{"amount":"1","impact":1.25}"#).expect("parse sample");
        assert!((sample.impact - 1.25).abs() < f64::EPSILON);
        let sample: Sample =
            serde_json::from_str(r#"{"amount":"1","impact":null}"#).expect("parse sample");
        assert_eq!(sample.impact, 0.0);
    }
}
