use std::path::Path;

use anyhow::Context;
use serde::de::DeserializeOwned;

/// 从 TOML 文件中读取配置
pub fn load_toml<T: DeserializeOwned>(path: impl AsRef<Path>) -> anyhow::Result<T> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).with_context(|| format!("failed to read config: {}", path.display()))?;
    parse_toml(&text).with_context(|| format!("failed to parse config: {}", path.display()))
}

/// 从字符串中解析 TOML 配置
pub fn parse_toml<T: DeserializeOwned>(text: &str) -> anyhow::Result<T> {
    let value = toml::from_str(text)?;
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(serde::Deserialize, Debug, PartialEq)]
    struct Sample {
        name: String,
        #[serde(default)]
        count: u32,
    }

    #[test]
    fn test_parse_toml() {
        let sample: Sample = parse_toml("name = \"a\"\ncount = 3").unwrap();
        assert_eq!(sample, Sample { name: "a".to_string(), count: 3 });

        // 缺省字段使用 default
        let sample: Sample = parse_toml("name = \"b\"").unwrap();
        assert_eq!(sample.count, 0);
    }

    #[test]
    fn test_load_missing_file() {
        let err = load_toml::<Sample>("definitely/not/here.toml").unwrap_err();
        assert!(err.to_string().contains("failed to read config"));
    }
}
