use serde::Deserialize;

/// Main configuration structure for Pricewatch
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub crawler: CrawlerConfig,
    #[serde(rename = "user-agent")]
    pub user_agent: UserAgentConfig,
    pub output: OutputConfig,
    pub run: RunConfig,
    pub site: SiteConfig,
}

/// Crawler behavior configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CrawlerConfig {
    /// Maximum number of fetches in flight at once
    pub max_concurrent_fetches: u32,

    /// Retries after the first failed attempt before a request is dropped
    #[serde(default = "default_max_request_retries")]
    pub max_request_retries: u32,

    /// Base delay between retries (milliseconds), multiplied by the attempt number
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    /// Per-request timeout (seconds)
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Optional global request rate limit
    #[serde(default)]
    pub max_requests_per_minute: Option<u32>,

    /// Number of handled requests between persistence checkpoints
    #[serde(default = "default_checkpoint_interval")]
    pub checkpoint_interval: u64,

    /// Optional wall-clock budget for the whole run (seconds)
    #[serde(default)]
    pub run_deadline_secs: Option<u64>,
}

fn default_max_request_retries() -> u32 {
    4
}

fn default_retry_delay_ms() -> u64 {
    500
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_checkpoint_interval() -> u64 {
    50
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct UserAgentConfig {
    /// Name of the crawler
    pub crawler_name: String,

    /// Version of the crawler
    pub crawler_version: String,

    /// URL with information about the crawler
    pub contact_url: String,

    /// Email address for crawler-related contact
    pub contact_email: String,
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct OutputConfig {
    /// Path to the SQLite database file
    pub database_path: String,

    /// Path to the markdown summary file
    pub summary_path: String,
}

/// Which part of the catalog a run covers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum RunMode {
    /// Whole catalog, starting from the shop's root page
    #[default]
    Full,
    /// A single fixed category, for smoke-testing extraction rules
    Test,
    /// The promotional / sale section only
    Promotional,
}

impl RunMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Test => "test",
            Self::Promotional => "promotional",
        }
    }
}

impl std::str::FromStr for RunMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "full" => Ok(Self::Full),
            "test" => Ok(Self::Test),
            "promotional" => Ok(Self::Promotional),
            other => Err(format!("unknown run mode '{}'", other)),
        }
    }
}

/// Run identity and seeding
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RunConfig {
    /// Run key; an interrupted run with the same key is resumed
    pub name: String,

    #[serde(default)]
    pub mode: RunMode,

    /// Catalog root, seeded in full mode
    pub root_url: String,

    /// Fixed category seeded in test mode
    #[serde(default)]
    pub test_url: Option<String>,

    /// Sale section seeded in promotional mode
    #[serde(default)]
    pub promotional_url: Option<String>,

    /// Explicit seeds, overriding the mode's default seed
    #[serde(default)]
    pub seeds: Vec<String>,
}

/// How a site exposes further listing pages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum PaginationStrategy {
    /// A page-index list whose second-to-last cell is the last page number
    #[default]
    PageCount,
    /// Only a "next page" link
    NextLink,
}

/// Pagination extraction rules
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct PaginationConfig {
    #[serde(default)]
    pub strategy: PaginationStrategy,

    /// Selector matching each cell of the page index
    #[serde(default)]
    pub page_index: Option<String>,

    /// Template for synthesized page URLs; `{base}` and `{n}` are substituted
    #[serde(default = "default_page_url_template")]
    pub page_url_template: String,

    /// Selector for the "next page" anchor
    #[serde(default)]
    pub next_link: Option<String>,
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            strategy: PaginationStrategy::default(),
            page_index: None,
            page_url_template: default_page_url_template(),
            next_link: None,
        }
    }
}

fn default_page_url_template() -> String {
    "{base}?page={n}".to_string()
}

/// A selector plus an optional attribute; text content is used without one
#[derive(Debug, Clone, Deserialize)]
pub struct FieldRule {
    pub selector: String,
    #[serde(default)]
    pub attr: Option<String>,
}

/// Per-item product extraction rules for listing pages
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub struct ProductConfig {
    /// Selector matching one product tile on a listing page
    #[serde(default)]
    pub item: Option<String>,
    #[serde(default)]
    pub id: Option<FieldRule>,
    #[serde(default)]
    pub name: Option<FieldRule>,
    #[serde(default)]
    pub url: Option<FieldRule>,
    #[serde(default)]
    pub price: Option<FieldRule>,
    #[serde(default)]
    pub original_price: Option<FieldRule>,
    #[serde(default)]
    pub currency: Option<FieldRule>,
    #[serde(default)]
    pub image: Option<FieldRule>,
    /// Item counts as in stock when this rule matches
    #[serde(default)]
    pub in_stock: Option<FieldRule>,
}

/// Site-specific extraction rules
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SiteConfig {
    /// Currency assumed when a product does not state one
    #[serde(default = "default_currency")]
    pub default_currency: String,

    /// Top-level category links on the root page
    #[serde(default)]
    pub category_links: Option<String>,

    /// Subcategory links on a category page
    #[serde(default)]
    pub subcategory_links: Option<String>,

    /// Links from listing pages to product detail pages
    #[serde(default)]
    pub product_links: Option<String>,

    /// Breadcrumb items, joined with " > " into the product category
    #[serde(default)]
    pub breadcrumbs: Option<String>,

    #[serde(default)]
    pub pagination: PaginationConfig,

    #[serde(default)]
    pub product: ProductConfig,
}

fn default_currency() -> String {
    "CZK".to_string()
}
