use crate::models::ParameterSet;

/// Extract a parameter as f64 with a default value
pub fn get_param(params: &ParameterSet, key: &str, default: f64) -> f64 {
    params.get(key).copied().unwrap_or(default)
}

/// Extract a parameter as usize with a minimum value
pub fn get_usize_param_min(params: &ParameterSet, key: &str, default: usize, min: usize) -> usize {
    params
        .get(key)
        .copied()
        .filter(|v| v.is_finite())
        .map(|v| v.round().max(min as f64) as usize)
        .unwrap_or(default)
}

/// Render a parameter set as a compact, stable `name: value` listing for logs.
pub fn format_parameters(params: &ParameterSet) -> String {
    let mut sorted: Vec<_> = params.iter().collect();
    sorted.sort_by(|a, b| a.0.cmp(b.0));
    sorted
        .iter()
        .map(|(k, v)| {
            let formatted = format!("{:.4}", v);
            let trimmed = formatted.trim_end_matches('0').trim_end_matches('.');
            let cleaned = if trimmed.is_empty() || trimmed == "-0" {
                "0"
            } else {
                trimmed
            };
            format!("{}: {}", k, cleaned)
        })
        .collect::<Vec<String>>()
        .join(", ")
}
