use crate::error::{InsightsError, InsightsResult};

pub const DEFAULT_FALLBACK_COST_PCT: f64 = 60.0;
pub const DEFAULT_ESTIMATE_BATCH: usize = 80;
pub const DEFAULT_PRODUCTS_PAGE_SIZE: u32 = 200;

/// Tunables of the profit pipeline.
#[derive(Clone, Debug, PartialEq)]
pub struct InsightsSettings {
    /// Percentage of revenue assumed as cost when a product has no catalog cost.
    pub fallback_cost_pct: f64,
    pub estimate_batch_size: usize,
    pub products_page_size: u32,
}

impl Default for InsightsSettings {
    fn default() -> Self {
        Self {
            fallback_cost_pct: DEFAULT_FALLBACK_COST_PCT,
            estimate_batch_size: DEFAULT_ESTIMATE_BATCH,
            products_page_size: DEFAULT_PRODUCTS_PAGE_SIZE,
        }
    }
}

impl InsightsSettings {
    pub fn from_env() -> InsightsResult<Self> {
        Self::from_env_with(|k| std::env::var(k).ok())
    }

    pub fn from_env_with<F>(mut get: F) -> InsightsResult<Self>
    where
        F: FnMut(&str) -> Option<String>,
    {
        let mut settings = Self::default();
        if let Some(raw) = get("BIZOPS_FALLBACK_COST_PCT") {
            settings.fallback_cost_pct = parse_setting("BIZOPS_FALLBACK_COST_PCT", &raw)?;
        }
        if let Some(raw) = get("BIZOPS_ESTIMATE_BATCH") {
            let size: usize = parse_setting("BIZOPS_ESTIMATE_BATCH", &raw)?;
            settings.estimate_batch_size = size.max(1);
        }
        if let Some(raw) = get("BIZOPS_PRODUCTS_PAGE_SIZE") {
            let size: u32 = parse_setting("BIZOPS_PRODUCTS_PAGE_SIZE", &raw)?;
            settings.products_page_size = size.max(1);
        }
        Ok(settings)
    }
}

fn parse_setting<T: std::str::FromStr>(name: &str, raw: &str) -> InsightsResult<T> {
    raw.trim()
        .parse::<T>()
        .map_err(|_| InsightsError::Validation(format!("{name} is not a valid number: {raw}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_when_env_is_empty() {
        let s = InsightsSettings::from_env_with(|_| None).unwrap();
        assert_eq!(s, InsightsSettings::default());
        assert_eq!(s.estimate_batch_size, 80);
    }

    #[test]
    fn reads_overrides_and_floors_batch_size() {
        let get = |k: &str| match k {
            "BIZOPS_FALLBACK_COST_PCT" => Some("45.5".into()),
            "BIZOPS_ESTIMATE_BATCH" => Some("0".into()),
            _ => None,
        };
        let s = InsightsSettings::from_env_with(get).unwrap();
        assert_eq!(s.fallback_cost_pct, 45.5);
        assert_eq!(s.estimate_batch_size, 1);
    }

    #[test]
    fn rejects_garbage() {
        let get = |k: &str| (k == "BIZOPS_PRODUCTS_PAGE_SIZE").then(|| "lots".to_string());
        assert!(matches!(
            InsightsSettings::from_env_with(get),
            Err(InsightsError::Validation(_))
        ));
    }
}
