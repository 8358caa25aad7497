//! In-process lore site for harvest tests.

use std::collections::HashMap;
use std::io::Cursor;
use std::path::PathBuf;
use std::sync::Arc;

use image::{ImageFormat, Rgb, RgbImage};
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

use lorebook_crawler::Fetcher;
use lorebook_imaging::ImageNormalizer;
use lorebook_shared::{AppConfig, HarvestConfig, NormalizerConfig};
use lorebook_storage::Storage;

use crate::pipeline::HarvestDeps;

/// Serves list, detail, bio, story and image responses for generated champions.
#[derive(Debug, Clone)]
pub(crate) struct FakeSite {
    /// Champion blocks on each language's list page (absent = zero).
    pub blocks: HashMap<String, usize>,
    /// Detail pages carry a link to the biography.
    pub detail_story_link: bool,
    /// Bio pages carry a continue link to the story.
    pub continue_link: bool,
    /// Image requests fail with 404.
    pub broken_images: bool,
}

impl FakeSite {
    pub fn new() -> Self {
        Self {
            blocks: HashMap::new(),
            detail_story_link: true,
            continue_link: true,
            broken_images: false,
        }
    }

    pub fn with_blocks(mut self, lang: &str, count: usize) -> Self {
        self.blocks.insert(lang.to_string(), count);
        self
    }

    pub fn code(index: usize) -> String {
        format!("champ{index:02}")
    }

    fn display_name(code: &str) -> String {
        let mut chars = code.chars();
        match chars.next() {
            Some(first) => first.to_uppercase().chain(chars).collect(),
            None => String::new(),
        }
    }

    fn list_page(&self, lang: &str) -> String {
        let count = self.blocks.get(lang).copied().unwrap_or(0);
        let items: String = (0..count)
            .map(|i| {
                let code = Self::code(i);
                format!(r#"<li class="item_30l8"><a href="/{lang}/champion/{code}/"><h1>{code}</h1></a></li>"#)
            })
            .collect();
        format!("<html><body><ul>{items}</ul></body></html>")
    }

    fn detail_page(&self, lang: &str, code: &str) -> String {
        let name = Self::display_name(code);
        let link = if self.detail_story_link {
            format!(r#"<a href="/{lang}/story/champion-{code}/">Biography</a>"#)
        } else {
            String::new()
        };
        format!(
            r#"<html><head><title>{name} - Universe</title></head><body>
            <h3 class="subheadline_rlsJ">the Tester</h3>
            <div class="factionText_EnRL"><h6><span>Runeterra</span></h6></div>
            <ul><li class="quote_2507"><p>"Testing is a virtue."</p></li></ul>
            {link}
            </body></html>"#
        )
    }

    fn bio_page(&self, lang: &str, code: &str) -> String {
        let continue_link = if self.continue_link {
            format!(r#"<a class="root_K4Th" href="/{lang}/story/{code}-color-story/">Continue</a>"#)
        } else {
            String::new()
        };
        format!(
            r#"<html><body>
            <div class="root_3nvd dark_1RHo"><p>Bio of {code}.</p></div>
            <div class="image_3oOd backgroundImage_5wQJ" data-am-url="/img/{code}.png"></div>
            {continue_link}
            </body></html>"#
        )
    }

    fn story_page(code: &str) -> String {
        format!(r#"<html><body><div class="root_3nvd dark_1RHo"><p>Story of {code}.</p></div></body></html>"#)
    }

    fn image() -> Vec<u8> {
        let img = RgbImage::from_pixel(8, 8, Rgb([200, 40, 40]));
        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, ImageFormat::Png).unwrap();
        buf.into_inner()
    }

    pub async fn serve(self) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET")).respond_with(self).mount(&server).await;
        server
    }
}

fn html(body: String) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(body, "text/html")
}

impl Respond for FakeSite {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let segments: Vec<&str> = request
            .url
            .path()
            .split('/')
            .filter(|s| !s.is_empty())
            .collect();

        match segments.as_slice() {
            [lang, "champions"] => html(self.list_page(lang)),
            [lang, "champion", code] => html(self.detail_page(lang, code)),
            // Fabricated biography URL
            [lang, "story", "champion", code] => html(self.bio_page(lang, code)),
            [lang, "story", slug] => {
                if let Some(code) = slug.strip_prefix("champion-") {
                    html(self.bio_page(lang, code))
                } else if let Some(code) = slug.strip_suffix("-color-story") {
                    html(Self::story_page(code))
                } else {
                    ResponseTemplate::new(404)
                }
            }
            ["img", _] if self.broken_images => ResponseTemplate::new(404),
            ["img", _] => ResponseTemplate::new(200).set_body_raw(Self::image(), "image/png"),
            _ => ResponseTemplate::new(404),
        }
    }
}

/// A fake site plus fresh storage and asset directories.
pub(crate) struct Harness {
    pub server: MockServer,
    pub storage: Arc<Storage>,
    pub root: PathBuf,
    pub config: HarvestConfig,
}

impl Harness {
    pub async fn start(site: FakeSite, languages: &[&str], previous_count: usize) -> Self {
        let server = site.serve().await;
        let root = std::env::temp_dir().join(format!("lorebook_harvest_{}", uuid::Uuid::now_v7()));
        let storage = Arc::new(Storage::open(&root.join("lore.db")).await.unwrap());

        let mut config = HarvestConfig::from(&AppConfig::default());
        config.base_url = server.uri();
        config.host_overrides.clear();
        config.languages = languages.iter().map(|l| l.to_string()).collect();
        config.previous_count = previous_count;
        config.settle_ms = 0;
        config.fetch_retries = 0;
        config.retry_backoff_ms = 1;

        Self {
            server,
            storage,
            root,
            config,
        }
    }

    pub fn deps(&self) -> HarvestDeps {
        let mut images = NormalizerConfig::from(&AppConfig::default());
        images.asset_root = self.root.clone();

        HarvestDeps {
            storage: Arc::clone(&self.storage),
            fetcher: Arc::new(Fetcher::new(&self.config).unwrap()),
            normalizer: Arc::new(ImageNormalizer::new(&images).unwrap()),
        }
    }

    /// Requests whose path has `segment` at position `index`.
    pub async fn count_requests(&self, index: usize, segment: &str) -> usize {
        self.server
            .received_requests()
            .await
            .unwrap_or_default()
            .iter()
            .filter(|req| {
                req.url
                    .path()
                    .split('/')
                    .filter(|s| !s.is_empty())
                    .nth(index)
                    == Some(segment)
            })
            .count()
    }

    /// Detail page fetches (`/<lang>/champion/<code>/`).
    pub async fn detail_fetches(&self) -> usize {
        self.count_requests(1, "champion").await
    }

    /// List page fetches for one language.
    pub async fn list_fetches(&self, lang: &str) -> usize {
        self.server
            .received_requests()
            .await
            .unwrap_or_default()
            .iter()
            .filter(|req| req.url.path() == format!("/{lang}/champions/"))
            .count()
    }
}
