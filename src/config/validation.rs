use crate::config::types::{
    Config, CrawlerConfig, FieldRule, OutputConfig, PaginationStrategy, RunConfig, RunMode,
    SiteConfig, UserAgentConfig,
};
use crate::ConfigError;
use scraper::Selector;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_crawler_config(&config.crawler)?;
    validate_user_agent_config(&config.user_agent)?;
    validate_output_config(&config.output)?;
    validate_run_config(&config.run)?;
    validate_site_config(&config.site)?;
    Ok(())
}

fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if config.max_concurrent_fetches < 1 || config.max_concurrent_fetches > 100 {
        return Err(ConfigError::Validation(format!(
            "max_concurrent_fetches must be between 1 and 100, got {}",
            config.max_concurrent_fetches
        )));
    }

    if config.request_timeout_secs < 1 {
        return Err(ConfigError::Validation(
            "request_timeout_secs must be >= 1".to_string(),
        ));
    }

    if config.checkpoint_interval < 1 {
        return Err(ConfigError::Validation(
            "checkpoint_interval must be >= 1".to_string(),
        ));
    }

    if config.max_requests_per_minute == Some(0) {
        return Err(ConfigError::Validation(
            "max_requests_per_minute must be >= 1 when set".to_string(),
        ));
    }

    if config.run_deadline_secs == Some(0) {
        return Err(ConfigError::Validation(
            "run_deadline_secs must be >= 1 when set".to_string(),
        ));
    }

    Ok(())
}

fn validate_user_agent_config(config: &UserAgentConfig) -> Result<(), ConfigError> {
    if config.crawler_name.is_empty() {
        return Err(ConfigError::Validation(
            "crawler_name cannot be empty".to_string(),
        ));
    }

    if !config
        .crawler_name
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-')
    {
        return Err(ConfigError::Validation(format!(
            "crawler_name must contain only alphanumeric characters and hyphens, got '{}'",
            config.crawler_name
        )));
    }

    Url::parse(&config.contact_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid contact_url: {}", e)))?;

    validate_email(&config.contact_email)?;

    Ok(())
}

fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "database_path cannot be empty".to_string(),
        ));
    }

    if config.summary_path.is_empty() {
        return Err(ConfigError::Validation(
            "summary_path cannot be empty".to_string(),
        ));
    }

    Ok(())
}

fn validate_run_config(config: &RunConfig) -> Result<(), ConfigError> {
    if config.name.is_empty()
        || !config
            .name
            .chars()
            .all(|c| c.is_alphanumeric() || c == '-' || c == '_')
    {
        return Err(ConfigError::Validation(format!(
            "run name must be non-empty and contain only alphanumerics, '-' or '_', got '{}'",
            config.name
        )));
    }

    validate_http_url("root_url", &config.root_url)?;

    match config.mode {
        RunMode::Full => {}
        RunMode::Test => match &config.test_url {
            Some(url) => validate_http_url("test_url", url)?,
            None if config.seeds.is_empty() => {
                return Err(ConfigError::Validation(
                    "test mode requires test_url or explicit seeds".to_string(),
                ))
            }
            None => {}
        },
        RunMode::Promotional => match &config.promotional_url {
            Some(url) => validate_http_url("promotional_url", url)?,
            None if config.seeds.is_empty() => {
                return Err(ConfigError::Validation(
                    "promotional mode requires promotional_url or explicit seeds".to_string(),
                ))
            }
            None => {}
        },
    }

    for seed in &config.seeds {
        validate_http_url("seed", seed)?;
    }

    Ok(())
}

fn validate_site_config(config: &SiteConfig) -> Result<(), ConfigError> {
    for selector in [
        &config.category_links,
        &config.subcategory_links,
        &config.product_links,
        &config.breadcrumbs,
        &config.pagination.page_index,
        &config.pagination.next_link,
        &config.product.item,
    ]
    .into_iter()
    .flatten()
    {
        validate_selector(selector)?;
    }

    for rule in [
        &config.product.id,
        &config.product.name,
        &config.product.url,
        &config.product.price,
        &config.product.original_price,
        &config.product.currency,
        &config.product.image,
        &config.product.in_stock,
    ]
    .into_iter()
    .flatten()
    {
        validate_field_rule(rule)?;
    }

    match config.pagination.strategy {
        PaginationStrategy::PageCount => {
            if !config.pagination.page_url_template.contains("{n}") {
                return Err(ConfigError::Validation(format!(
                    "page_url_template must contain {{n}}, got '{}'",
                    config.pagination.page_url_template
                )));
            }
        }
        PaginationStrategy::NextLink => {
            if config.pagination.next_link.is_none() {
                return Err(ConfigError::Validation(
                    "next-link pagination requires a next_link selector".to_string(),
                ));
            }
        }
    }

    if config.product.item.is_some() && config.product.price.is_none() {
        return Err(ConfigError::Validation(
            "product item selector requires a price rule".to_string(),
        ));
    }

    if config.product.item.is_some() && config.product.id.is_none() && config.product.url.is_none()
    {
        return Err(ConfigError::Validation(
            "product item selector requires an id or url rule".to_string(),
        ));
    }

    if config.default_currency.trim().is_empty() {
        return Err(ConfigError::Validation(
            "default_currency cannot be empty".to_string(),
        ));
    }

    Ok(())
}

fn validate_field_rule(rule: &FieldRule) -> Result<(), ConfigError> {
    validate_selector(&rule.selector)?;
    if rule.attr.as_deref().is_some_and(|a| a.trim().is_empty()) {
        return Err(ConfigError::Validation(format!(
            "attribute name for '{}' cannot be empty",
            rule.selector
        )));
    }
    Ok(())
}

fn validate_selector(selector: &str) -> Result<(), ConfigError> {
    Selector::parse(selector)
        .map(|_| ())
        .map_err(|e| ConfigError::InvalidSelector(format!("'{}': {:?}", selector, e)))
}

fn validate_http_url(field: &str, value: &str) -> Result<(), ConfigError> {
    let url = Url::parse(value)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid {} '{}': {}", field, value, e)))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ConfigError::Validation(format!(
            "{} '{}' must use http or https",
            field, value
        )));
    }

    Ok(())
}

/// Basic email validation
fn validate_email(email: &str) -> Result<(), ConfigError> {
    let parts: Vec<&str> = email.split('@').collect();
    if parts.len() != 2 || parts[0].is_empty() || parts[1].is_empty() {
        return Err(ConfigError::Validation(format!(
            "Invalid email format: '{}'",
            email
        )));
    }

    if !parts[1].contains('.') {
        return Err(ConfigError::Validation(format!(
            "Invalid email domain: '{}'",
            email
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PaginationConfig;

    fn run_config(mode: RunMode) -> RunConfig {
        RunConfig {
            name: "shop-cz".to_string(),
            mode,
            root_url: "https://shop.example.com/".to_string(),
            test_url: None,
            promotional_url: None,
            seeds: vec![],
        }
    }

    #[test]
    fn test_validate_email() {
        assert!(validate_email("user@example.com").is_ok());
        assert!(validate_email("admin@sub.example.com").is_ok());

        assert!(validate_email("").is_err());
        assert!(validate_email("invalid").is_err());
        assert!(validate_email("@example.com").is_err());
        assert!(validate_email("user@").is_err());
        assert!(validate_email("user@domain").is_err());
    }

    #[test]
    fn test_validate_selector() {
        assert!(validate_selector("#snippet--subcategories a").is_ok());
        assert!(validate_selector("[itemprop=itemListElement]").is_ok());
        assert!(matches!(
            validate_selector("a[[["),
            Err(ConfigError::InvalidSelector(_))
        ));
    }

    #[test]
    fn test_run_modes_need_their_seed_url() {
        assert!(validate_run_config(&run_config(RunMode::Full)).is_ok());
        assert!(validate_run_config(&run_config(RunMode::Test)).is_err());
        assert!(validate_run_config(&run_config(RunMode::Promotional)).is_err());

        let mut test = run_config(RunMode::Test);
        test.test_url = Some("https://shop.example.com/masazni-pripravky/".to_string());
        assert!(validate_run_config(&test).is_ok());

        let mut promo = run_config(RunMode::Promotional);
        promo.seeds = vec!["https://shop.example.com/akce".to_string()];
        assert!(validate_run_config(&promo).is_ok());
    }

    #[test]
    fn test_run_name_characters() {
        let mut config = run_config(RunMode::Full);
        config.name = "shop cz".to_string();
        assert!(validate_run_config(&config).is_err());
    }

    #[test]
    fn test_seed_must_be_http() {
        let mut config = run_config(RunMode::Full);
        config.seeds = vec!["ftp://shop.example.com/".to_string()];
        assert!(validate_run_config(&config).is_err());
    }

    #[test]
    fn test_next_link_strategy_requires_selector() {
        let site = SiteConfig {
            default_currency: "CZK".to_string(),
            category_links: None,
            subcategory_links: None,
            product_links: None,
            breadcrumbs: None,
            pagination: PaginationConfig {
                strategy: PaginationStrategy::NextLink,
                ..PaginationConfig::default()
            },
            product: Default::default(),
        };
        assert!(validate_site_config(&site).is_err());
    }

    #[test]
    fn test_page_template_requires_page_number() {
        let site = SiteConfig {
            default_currency: "CZK".to_string(),
            category_links: None,
            subcategory_links: None,
            product_links: None,
            breadcrumbs: None,
            pagination: PaginationConfig {
                page_url_template: "{base}?page=1".to_string(),
                ..PaginationConfig::default()
            },
            product: Default::default(),
        };
        assert!(validate_site_config(&site).is_err());
    }
}
