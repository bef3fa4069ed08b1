use std::collections::HashMap;

/// Parse the query string of a URI into a key/value map.
///
/// Values are URL-decoded; for a repeated key only the last value is kept.
pub fn parse_query_params(uri: &str) -> HashMap<String, String> {
    let mut params = HashMap::new();

    if let Some(query_start) = uri.find('?') {
        let query = &uri[query_start + 1..];
        for param in query.split('&') {
            if let Some(eq_idx) = param.find('=') {
                let key = &param[..eq_idx];
                let encoded_value = &param[eq_idx + 1..];
                let decoded = urlencoding::decode(encoded_value)
                    .unwrap_or(std::borrow::Cow::Borrowed(encoded_value))
                    .to_string();
                params.insert(key.to_string(), decoded);
            } else {
                // Flag parameter without value
                params.insert(param.to_string(), String::new());
            }
        }
    }

    params
}

pub fn get_string(params: &HashMap<String, String>, key: &str) -> Option<String> {
    params.get(key).cloned()
}

/// The `count` truncation limit: optional positive integer. Absent,
/// unparsable, or non-positive all mean unlimited.
pub fn get_count(params: &HashMap<String, String>) -> Option<usize> {
    params
        .get("count")
        .and_then(|s| s.parse::<i64>().ok())
        .filter(|n| *n > 0)
        .map(|n| n as usize)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_and_decodes() {
        let params = parse_query_params("/api/user/get.json?screen_name=%40ed&count=2");
        assert_eq!(params.get("screen_name"), Some(&"@ed".to_string()));
        assert_eq!(get_count(&params), Some(2));
    }

    #[test]
    fn count_edge_cases_mean_unlimited() {
        assert_eq!(get_count(&parse_query_params("/x")), None);
        assert_eq!(get_count(&parse_query_params("/x?count=0")), None);
        assert_eq!(get_count(&parse_query_params("/x?count=-3")), None);
        assert_eq!(get_count(&parse_query_params("/x?count=abc")), None);
    }
}
