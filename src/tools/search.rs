//! 网页检索：分页抓取搜索结果页，按抽取规则收集文本，拼接后写入搜索缓存
//!
//! 1. 去掉触发短语得到规范化查询词（缓存 key）；命中缓存直接返回，不发请求
//! 2. 否则 GET 搜索结果页（每次请求轮换 User-Agent），按规则抽取片段
//! 3. 有「下一页」链接就继续，页与页严格串行；翻页有硬上限，链接成环也会停
//! 4. 片段以空行拼接，写入缓存，返回「前缀 + 前 N 个字符 + ...」
//!
//! 网络错误 / 非 2xx / 超时 与 解析错误 分别对应两条固定提示，不自动重试。

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, USER_AGENT};
use reqwest::{Client, Url};
use scraper::{Html, Selector};
use thiserror::Error;

use crate::config::SearchSection;
use crate::memory::SearchCache;
use crate::tools::rules::{CompiledRuleSet, RuleError, RuleSet};

const SEARCH_PATH: &str = "/search";

#[derive(Error, Debug)]
pub enum RetrievalError {
    #[error("request failed: {0}")]
    Network(String),

    #[error("HTTP {0}")]
    Status(u16),

    #[error("request timed out")]
    Timeout,

    #[error("parse failed: {0}")]
    Parse(String),
}

impl RetrievalError {
    fn from_reqwest(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            RetrievalError::Timeout
        } else {
            RetrievalError::Network(e.to_string())
        }
    }

    /// 面向用户的固定提示
    pub fn user_message(&self) -> &'static str {
        match self {
            RetrievalError::Network(_) | RetrievalError::Status(_) | RetrievalError::Timeout => {
                "Erro ao acessar os resultados da pesquisa."
            }
            RetrievalError::Parse(_) => "Erro ao processar os resultados da pesquisa.",
        }
    }
}

/// 页面抓取接口（HTTP 实现之外，测试可注入固定页面）
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &Url) -> Result<String, RetrievalError>;
}

/// HTTP 抓取：带超时，User-Agent 按请求轮换
pub struct HttpPageFetcher {
    client: Client,
    user_agents: Vec<String>,
    next_agent: AtomicUsize,
}

impl HttpPageFetcher {
    pub fn new(user_agents: Vec<String>, timeout_secs: u64) -> Result<Self, RetrievalError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(RetrievalError::from_reqwest)?;
        let user_agents = if user_agents.is_empty() {
            vec!["Mozilla/5.0".to_string()]
        } else {
            user_agents
        };
        Ok(Self {
            client,
            user_agents,
            next_agent: AtomicUsize::new(0),
        })
    }

    fn next_user_agent(&self) -> &str {
        let i = self.next_agent.fetch_add(1, Ordering::Relaxed);
        &self.user_agents[i % self.user_agents.len()]
    }
}

#[async_trait]
impl PageFetcher for HttpPageFetcher {
    async fn fetch(&self, url: &Url) -> Result<String, RetrievalError> {
        let resp = self
            .client
            .get(url.clone())
            .header(USER_AGENT, self.next_user_agent())
            .header(ACCEPT, "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8")
            .header(ACCEPT_LANGUAGE, "pt-BR,pt;q=0.9,en;q=0.8")
            .send()
            .await
            .map_err(RetrievalError::from_reqwest)?;
        if !resp.status().is_success() {
            return Err(RetrievalError::Status(resp.status().as_u16()));
        }
        resp.text().await.map_err(RetrievalError::from_reqwest)
    }
}

/// 一次检索的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Retrieval {
    /// 规范化查询词（缓存 key）
    pub query: String,
    /// 返回给用户的摘要
    pub message: String,
    /// 本次是否新写入了缓存
    pub newly_cached: bool,
}

pub struct WebRetriever {
    fetcher: Arc<dyn PageFetcher>,
    base_url: Url,
    rules: CompiledRuleSet,
    next_page: Selector,
    trigger_pattern: Option<Regex>,
    max_pages: usize,
    summary_chars: usize,
}

impl WebRetriever {
    pub fn new(
        fetcher: Arc<dyn PageFetcher>,
        cfg: &SearchSection,
        rules: &RuleSet,
        search_triggers: &[String],
    ) -> Result<Self, RuleError> {
        let base_url = Url::parse(&cfg.base_url)
            .map_err(|e| RuleError::InvalidLocator(format!("{}: {}", cfg.base_url, e)))?;
        let next_css = format!(
            r#"a[aria-label="{}"]"#,
            cfg.next_page_label.replace('\\', "\\\\").replace('"', "\\\"")
        );
        let next_page = Selector::parse(&next_css).map_err(|e| RuleError::Selector {
            selector: next_css.clone(),
            reason: e.to_string(),
        })?;
        let rules = rules.compile()?;
        tracing::info!(version = rules.version(), "search extraction rules loaded");

        Ok(Self {
            fetcher,
            base_url,
            rules,
            next_page,
            trigger_pattern: trigger_pattern(search_triggers),
            max_pages: cfg.max_pages.max(1),
            summary_chars: cfg.summary_chars,
        })
    }

    /// 去掉所有搜索触发短语（大小写不敏感，长的优先），折叠空白并转小写
    pub fn normalize_query(&self, text: &str) -> String {
        let stripped = match &self.trigger_pattern {
            Some(re) => re.replace_all(text, " "),
            None => text.into(),
        };
        stripped
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .trim_matches(|c: char| c == ':' || c == ',' || c.is_whitespace())
            .to_lowercase()
    }

    fn search_url(&self, query: &str) -> Result<Url, RetrievalError> {
        let mut url = self
            .base_url
            .join(SEARCH_PATH)
            .map_err(|e| RetrievalError::Parse(e.to_string()))?;
        url.query_pairs_mut().append_pair("q", query);
        Ok(url)
    }

    fn summary(&self, query: &str, content: &str) -> String {
        let head: String = content.chars().take(self.summary_chars).collect();
        format!(
            "Resultados salvos para a pesquisa: {}\nConteúdo da página:\n{}...",
            query, head
        )
    }

    /// 解析单页：抽取片段并找到「下一页」（Html 不跨 await 持有）
    fn parse_page(&self, body: &str, page_url: &Url) -> Result<(Vec<String>, Option<Url>), RetrievalError> {
        let document = Html::parse_document(body);
        let fragments = self.rules.extract(&document);
        let next = document
            .select(&self.next_page)
            .find_map(|a| a.value().attr("href"))
            .map(|href| {
                page_url
                    .join(href)
                    .map_err(|e| RetrievalError::Parse(format!("next link {:?}: {}", href, e)))
            })
            .transpose()?;
        Ok((fragments, next))
    }

    async fn fetch_all(&self, query: &str) -> Result<Vec<String>, RetrievalError> {
        let mut fragments = Vec::new();
        let mut visited = HashSet::new();
        let mut next = Some(self.search_url(query)?);
        let mut pages = 0usize;

        while let Some(url) = next.take() {
            if pages >= self.max_pages {
                tracing::warn!(query = %query, pages, "page ceiling reached, stopping pagination");
                break;
            }
            if !visited.insert(url.clone()) {
                tracing::warn!(url = %url, "next link cycles, stopping pagination");
                break;
            }
            tracing::info!(url = %url, page = pages + 1, "fetching search results page");
            let body = self.fetcher.fetch(&url).await?;
            pages += 1;

            let (found, following) = self.parse_page(&body, &url)?;
            tracing::debug!(fragments = found.len(), has_next = following.is_some(), "page parsed");
            fragments.extend(found);
            next = following;
        }
        Ok(fragments)
    }

    /// 检索并写缓存；错误原样返回
    pub async fn try_retrieve(
        &self,
        cache: &mut SearchCache,
        utterance: &str,
    ) -> Result<Retrieval, RetrievalError> {
        let query = self.normalize_query(utterance);

        if let Some(content) = cache.get(&query) {
            tracing::info!(query = %query, "search cache hit");
            return Ok(Retrieval {
                message: self.summary(&query, content),
                query,
                newly_cached: false,
            });
        }

        tracing::info!(query = %query, "searching the web");
        let fragments = self.fetch_all(&query).await?;
        let content = fragments.join("\n\n");
        let message = self.summary(&query, &content);
        let newly_cached = cache.insert(query.clone(), content);

        Ok(Retrieval {
            query,
            message,
            newly_cached,
        })
    }

    /// 检索；失败时降级为固定提示，不向调用方传播错误
    pub async fn retrieve(&self, cache: &mut SearchCache, utterance: &str) -> Retrieval {
        match self.try_retrieve(cache, utterance).await {
            Ok(r) => r,
            Err(e) => {
                tracing::error!(error = %e, "search failed");
                Retrieval {
                    query: self.normalize_query(utterance),
                    message: e.user_message().to_string(),
                    newly_cached: false,
                }
            }
        }
    }
}

fn trigger_pattern(triggers: &[String]) -> Option<Regex> {
    let mut triggers: Vec<&str> = triggers
        .iter()
        .map(|t| t.trim())
        .filter(|t| !t.is_empty())
        .collect();
    if triggers.is_empty() {
        return None;
    }
    triggers.sort_by_key(|t| std::cmp::Reverse(t.chars().count()));
    let alternation = triggers
        .iter()
        .map(|t| regex::escape(t))
        .collect::<Vec<_>>()
        .join("|");
    Regex::new(&format!("(?i){}", alternation)).ok()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use super::*;
    use crate::core::classifier::DEFAULT_SEARCH_TRIGGERS;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// 固定页面抓取器：按 URL 返回页面，并记录请求次数
    #[derive(Default)]
    struct StaticPages {
        pages: HashMap<String, Result<String, u16>>,
        fetched: Mutex<Vec<String>>,
    }

    impl StaticPages {
        fn page(mut self, url: &str, html: &str) -> Self {
            self.pages.insert(url.to_string(), Ok(html.to_string()));
            self
        }

        fn status(mut self, url: &str, status: u16) -> Self {
            self.pages.insert(url.to_string(), Err(status));
            self
        }

        fn fetch_count(&self) -> usize {
            self.fetched.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl PageFetcher for StaticPages {
        async fn fetch(&self, url: &Url) -> Result<String, RetrievalError> {
            self.fetched.lock().unwrap().push(url.to_string());
            match self.pages.get(url.as_str()) {
                Some(Ok(html)) => Ok(html.clone()),
                Some(Err(status)) => Err(RetrievalError::Status(*status)),
                None => Err(RetrievalError::Network(format!("no page for {url}"))),
            }
        }
    }

    fn triggers() -> Vec<String> {
        DEFAULT_SEARCH_TRIGGERS.iter().map(|s| s.to_string()).collect()
    }

    fn retriever(fetcher: Arc<dyn PageFetcher>, cfg: SearchSection) -> WebRetriever {
        WebRetriever::new(fetcher, &cfg, &RuleSet::default(), &triggers()).unwrap()
    }

    const GATOS_URL: &str = "https://www.google.com/search?q=gatos";

    const THREE_FRAGMENTS: &str = r#"<html><body>
        <div class="BNeawe s3v9rd AP7Wnd">A</div>
        <div class="BNeawe s3v9rd AP7Wnd">B</div>
        <div class="BNeawe s3v9rd AP7Wnd">C</div>
    </body></html>"#;

    #[test]
    fn test_normalize_query() {
        let r = retriever(Arc::new(StaticPages::default()), SearchSection::default());
        assert_eq!(r.normalize_query("pesquise gatos"), "gatos");
        assert_eq!(r.normalize_query("Pesquise sobre   Gatos Persas "), "gatos persas");
        assert_eq!(r.normalize_query("faça uma pesquisa: clima em SP"), "clima em sp");
    }

    #[tokio::test]
    async fn test_single_page_three_fragments() {
        let pages = Arc::new(StaticPages::default().page(GATOS_URL, THREE_FRAGMENTS));
        let r = retriever(pages.clone(), SearchSection::default());
        let mut cache = SearchCache::new();

        let out = r.try_retrieve(&mut cache, "pesquise gatos").await.unwrap();

        assert_eq!(cache.get("gatos"), Some("A\n\nB\n\nC"));
        assert!(out.newly_cached);
        assert!(out
            .message
            .starts_with("Resultados salvos para a pesquisa: gatos\nConteúdo da página:\n"));
        assert!(out.message.contains("A\n\nB\n\nC"));
        assert!(out.message.ends_with("..."));
        assert_eq!(pages.fetch_count(), 1);
    }

    #[tokio::test]
    async fn test_cache_makes_second_call_free_and_identical() {
        let pages = Arc::new(StaticPages::default().page(GATOS_URL, THREE_FRAGMENTS));
        let r = retriever(pages.clone(), SearchSection::default());
        let mut cache = SearchCache::new();

        let first = r.retrieve(&mut cache, "pesquise gatos").await;
        let second = r.retrieve(&mut cache, "PESQUISE   gatos").await;

        assert_eq!(first.message, second.message);
        assert!(!second.newly_cached);
        assert_eq!(pages.fetch_count(), 1);
    }

    #[tokio::test]
    async fn test_summary_truncated_to_configured_chars() {
        let long = "x".repeat(4000);
        let html = format!("<p>{long}</p>");
        let pages = Arc::new(StaticPages::default().page(GATOS_URL, &html));
        let r = retriever(pages, SearchSection::default());
        let mut cache = SearchCache::new();

        let out = r.try_retrieve(&mut cache, "pesquise gatos").await.unwrap();
        let body = out.message.split("Conteúdo da página:\n").nth(1).unwrap();
        assert_eq!(body, format!("{}...", "x".repeat(1500)));
        assert_eq!(cache.get("gatos").map(str::len), Some(4000));
    }

    #[tokio::test]
    async fn test_follows_next_page_links() {
        let page1 = r#"<div class="kCrYT">um</div><a aria-label="Próxima" href="/search?q=gatos&start=10">›</a>"#;
        let page2 = r#"<div class="kCrYT">dois</div>"#;
        let pages = Arc::new(
            StaticPages::default()
                .page(GATOS_URL, page1)
                .page("https://www.google.com/search?q=gatos&start=10", page2),
        );
        let r = retriever(pages.clone(), SearchSection::default());
        let mut cache = SearchCache::new();

        r.try_retrieve(&mut cache, "pesquise gatos").await.unwrap();
        assert_eq!(cache.get("gatos"), Some("um\n\ndois"));
        assert_eq!(pages.fetch_count(), 2);
    }

    #[tokio::test]
    async fn test_cycling_next_link_terminates() {
        let page = r#"<p>loop</p><a aria-label="Próxima" href="/search?q=gatos">›</a>"#;
        let pages = Arc::new(StaticPages::default().page(GATOS_URL, page));
        let r = retriever(pages.clone(), SearchSection::default());
        let mut cache = SearchCache::new();

        r.try_retrieve(&mut cache, "pesquise gatos").await.unwrap();
        assert_eq!(pages.fetch_count(), 1);
        assert_eq!(cache.get("gatos"), Some("loop"));
    }

    #[tokio::test]
    async fn test_page_ceiling() {
        let mut pages = StaticPages::default();
        for i in 0..20 {
            let url = if i == 0 {
                GATOS_URL.to_string()
            } else {
                format!("{GATOS_URL}&start={}", i * 10)
            };
            let html = format!(
                r#"<p>p{i}</p><a aria-label="Próxima" href="/search?q=gatos&start={}">›</a>"#,
                (i + 1) * 10
            );
            pages = pages.page(&url, &html);
        }
        let pages = Arc::new(pages);
        let cfg = SearchSection {
            max_pages: 3,
            ..SearchSection::default()
        };
        let r = retriever(pages.clone(), cfg);
        let mut cache = SearchCache::new();

        r.try_retrieve(&mut cache, "pesquise gatos").await.unwrap();
        assert_eq!(pages.fetch_count(), 3);
        assert_eq!(cache.get("gatos"), Some("p0\n\np1\n\np2"));
    }

    #[tokio::test]
    async fn test_http_500_leaves_cache_untouched() {
        let pages = Arc::new(StaticPages::default().status(GATOS_URL, 500));
        let r = retriever(pages, SearchSection::default());
        let mut cache = SearchCache::new();

        let out = r.retrieve(&mut cache, "pesquise gatos").await;
        assert_eq!(out.message, "Erro ao acessar os resultados da pesquisa.");
        assert!(!out.newly_cached);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_bad_next_link_is_parse_error() {
        let page = r#"<p>x</p><a aria-label="Próxima" href="http://[::1">›</a>"#;
        let pages = Arc::new(StaticPages::default().page(GATOS_URL, page));
        let r = retriever(pages, SearchSection::default());
        let mut cache = SearchCache::new();

        let out = r.retrieve(&mut cache, "pesquise gatos").await;
        assert_eq!(out.message, "Erro ao processar os resultados da pesquisa.");
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_http_fetcher_against_mock_server() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .and(query_param("q", "gatos"))
            .respond_with(ResponseTemplate::new(200).set_body_string(THREE_FRAGMENTS))
            .expect(1)
            .mount(&server)
            .await;

        let cfg = SearchSection {
            base_url: server.uri(),
            ..SearchSection::default()
        };
        let fetcher = Arc::new(HttpPageFetcher::new(cfg.user_agents.clone(), 5).unwrap());
        let r = retriever(fetcher, cfg);
        let mut cache = SearchCache::new();

        r.retrieve(&mut cache, "pesquise gatos").await;
        let again = r.retrieve(&mut cache, "pesquise gatos").await;
        assert!(again.message.contains("A\n\nB\n\nC"));
    }

    #[tokio::test]
    async fn test_http_fetcher_status_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let fetcher = HttpPageFetcher::new(vec![], 5).unwrap();
        let url = Url::parse(&format!("{}/search?q=x", server.uri())).unwrap();
        assert!(matches!(
            fetcher.fetch(&url).await,
            Err(RetrievalError::Status(500))
        ));
    }

    #[tokio::test]
    async fn test_http_fetcher_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(THREE_FRAGMENTS)
                    .set_delay(Duration::from_secs(3)),
            )
            .mount(&server)
            .await;

        let fetcher = Arc::new(HttpPageFetcher::new(vec![], 1).unwrap());
        let url = Url::parse(&format!("{}/search?q=gatos", server.uri())).unwrap();
        assert!(matches!(fetcher.fetch(&url).await, Err(RetrievalError::Timeout)));

        let cfg = SearchSection {
            base_url: server.uri(),
            ..SearchSection::default()
        };
        let r = retriever(fetcher, cfg);
        let mut cache = SearchCache::new();
        let out = r.retrieve(&mut cache, "pesquise gatos").await;
        assert_eq!(out.message, "Erro ao acessar os resultados da pesquisa.");
        assert!(!out.newly_cached);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_user_agent_rotation() {
        let fetcher = HttpPageFetcher::new(vec!["a".into(), "b".into()], 5).unwrap();
        let seen: Vec<String> = (0..4).map(|_| fetcher.next_user_agent().to_string()).collect();
        assert_eq!(seen, vec!["a", "b", "a", "b"]);
    }
}
