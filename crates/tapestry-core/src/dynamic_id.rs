//! Model IDs minted for dynamic proxies.
//!
//! A dynamic proxy does not own a stored genome. Its models are addressed by
//! `"{proxy}::{suffix}"`, where the suffix is either `ALL` for the summed view
//! or a time value for a single slider position.

pub const DYNAMIC_SEPARATOR: &str = "::";
pub const SUM_SUFFIX: &str = "ALL";

pub fn sum_model_id(proxy_id: &str) -> String {
    format!("{proxy_id}{DYNAMIC_SEPARATOR}{SUM_SUFFIX}")
}

pub fn time_model_id(proxy_id: &str, time: u32) -> String {
    format!("{proxy_id}{DYNAMIC_SEPARATOR}{time}")
}

pub fn is_dynamic_model_id(model_id: &str) -> bool {
    extract_proxy_id(model_id).is_some()
}

pub fn is_sum_model_id(model_id: &str) -> bool {
    split(model_id).is_some_and(|(_, suffix)| suffix == SUM_SUFFIX)
}

pub fn extract_proxy_id(model_id: &str) -> Option<&str> {
    split(model_id).map(|(proxy, _)| proxy)
}

pub fn extract_time(model_id: &str) -> Option<u32> {
    split(model_id).and_then(|(_, suffix)| suffix.parse().ok())
}

fn split(model_id: &str) -> Option<(&str, &str)> {
    let (proxy, suffix) = model_id.rsplit_once(DYNAMIC_SEPARATOR)?;
    if proxy.is_empty() || suffix.is_empty() {
        return None;
    }
    if suffix != SUM_SUFFIX && suffix.parse::<u32>().is_err() {
        return None;
    }
    Some((proxy, suffix))
}
