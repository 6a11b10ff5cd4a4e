//! Video comparison: rank search results per platform and write them to a
//! spreadsheet, with thumbnails placed next to each row.

use std::path::{Path, PathBuf};

use serde_json::{Value, json};
use tracing::{debug, info, instrument};

use researchkit_host::{Browser, HostTransport, Spreadsheet};
use researchkit_shared::{Placement, Result, VideoEntry, VideoPlatform, VideosConfig};

use crate::collect::{PageLoad, close_tab, fill_query, nth, open_page, read_text};
use crate::output::{ArtifactMeta, RunRecorder, resolve_output};
use crate::parse::{clean_text, parse_views};
use crate::pipeline::{ProgressReporter, StepLog, StepStage, WorkflowOutcome, pause};

pub const WORKFLOW: &str = "videos";

const HEADER: [&str; 7] = ["Platform", "Rank", "Image", "Title", "Views", "Raw Views", "Link"];

/// Missing titles probed past a gap before a section counts as finished.
const LOOK_AHEAD: u32 = 2;

/// Run the comparison for `config.topic` across every configured platform.
#[instrument(skip_all, fields(topic = %config.topic, platforms = config.platforms.len()))]
pub async fn run<B: Browser, T: HostTransport>(
    browser: &B,
    sheet: &Spreadsheet<T>,
    config: &VideosConfig,
    output_dir: &Path,
    progress: &dyn ProgressReporter,
) -> WorkflowOutcome {
    let result = execute(browser, sheet, config, output_dir, progress).await;
    let outcome = WorkflowOutcome::from_result(WORKFLOW, result);
    progress.done(&outcome);
    outcome
}

async fn execute<B: Browser, T: HostTransport>(
    browser: &B,
    sheet: &Spreadsheet<T>,
    config: &VideosConfig,
    output_dir: &Path,
    progress: &dyn ProgressReporter,
) -> Result<WorkflowOutcome> {
    let workbook = resolve_output(output_dir, &config.output_file);
    let recorder = RunRecorder::start(WORKFLOW, &workbook);
    let mut log = StepLog::new();

    let thumbs = config
        .capture_thumbnails
        .then(|| resolve_output(output_dir, &config.thumbnail_dir));
    if let Some(dir) = &thumbs {
        if let Err(e) = std::fs::create_dir_all(dir) {
            debug!(dir = %dir.display(), error = %e, "thumbnail directory not created locally");
        }
    }

    // --- Phase 1: Scrape platforms ---
    progress.phase("Searching video platforms");
    let mut videos = Vec::new();
    for (i, platform) in config.platforms.iter().enumerate() {
        progress.step(i + 1, config.platforms.len(), &platform.name);
        match scrape_platform(browser, sheet, platform, &config.topic, thumbs.as_deref(), &mut log).await {
            Ok(found) => {
                info!(platform = %platform.name, count = found.len(), "videos collected");
                videos.extend(found);
            }
            Err(e) => log.record(StepStage::Extraction, &platform.name, &e),
        }
    }

    if videos.is_empty() {
        let outcome = WorkflowOutcome::failure(WORKFLOW, "No videos collected").with_failures(log);
        return Ok(recorder.finish(outcome, None));
    }

    // --- Phase 2: Spreadsheet ---
    progress.phase("Writing spreadsheet");
    let file = workbook.to_string_lossy();
    sheet
        .write_range(&file, &config.sheet, "A1", &rows(&videos))
        .await?;

    let mut placed = 0;
    for (k, video) in videos.iter().enumerate() {
        let Some(image) = &video.thumbnail else {
            continue;
        };
        let at = Placement {
            top: config.thumbnail.top + k as f64 * config.row_step,
            ..config.thumbnail
        };
        match sheet.insert_picture(&file, &config.sheet, image, &at).await {
            Ok(()) => placed += 1,
            Err(e) => log.record(StepStage::Host, format!("picture {}", video.title), &e),
        }
    }

    let outcome = WorkflowOutcome::success(WORKFLOW, format!("Spreadsheet written: {file}"))
        .with_count("videos", videos.len())
        .with_count("thumbnails", placed)
        .with_failures(log);
    Ok(recorder.finish(outcome, ArtifactMeta::from_file(&workbook)))
}

fn rows(videos: &[VideoEntry]) -> Vec<Vec<Value>> {
    std::iter::once(HEADER.iter().map(|h| json!(h)).collect::<Vec<_>>())
        .chain(videos.iter().map(|v| {
            vec![
                json!(v.platform),
                json!(v.rank),
                json!(""),
                json!(v.title),
                json!(v.views),
                json!(v.raw_views),
                json!(v.url),
            ]
        }))
        .collect()
}

// ---------------------------------------------------------------------------
// Scraping
// ---------------------------------------------------------------------------

async fn scrape_platform<B: Browser, T: HostTransport>(
    browser: &B,
    sheet: &Spreadsheet<T>,
    platform: &VideoPlatform,
    topic: &str,
    thumbs: Option<&Path>,
    log: &mut StepLog,
) -> Result<Vec<VideoEntry>> {
    let url = fill_query(&platform.search_url, topic);
    let load = PageLoad {
        wait_selector: Some(platform.ready_selector.as_str()),
        wait_timeout_ms: platform.ready_timeout_ms,
        idle_timeout_ms: (platform.idle_timeout_ms > 0).then_some(platform.idle_timeout_ms),
        settle_ms: 0,
    };
    let tab = open_page(browser, &url, &load).await?;

    load_more(browser, &tab, platform).await;

    let sections: Vec<String> = match &platform.section_selector {
        Some(sel) => (1..=platform.max_sections)
            .map(|s| format!("{} ", nth(sel, "s", s)))
            .collect(),
        None => vec![String::new()],
    };

    let mut videos: Vec<VideoEntry> = Vec::new();
    'sections: for prefix in &sections {
        let title_at = |n: u32| {
            format!(
                "{prefix}{} {}",
                nth(&platform.item_selector, "n", n),
                platform.title_selector
            )
        };

        for n in 1..=platform.max_scan {
            if videos.len() >= platform.max_items {
                break 'sections;
            }
            let title = clean_text(&read_text(browser, &tab, &title_at(n)).await);
            if title.is_empty() {
                if !gap_continues(browser, &tab, n, &title_at).await {
                    debug!(platform = %platform.name, section = %prefix.trim(), n, "end of section");
                    break;
                }
                continue;
            }

            let item = format!("{prefix}{}", nth(&platform.item_selector, "n", n));
            let raw_views = clean_text(&read_text(browser, &tab, &format!("{item} {}", platform.views_selector)).await);
            let rank = videos.len() as u32 + 1;

            let thumbnail = match (thumbs, &platform.thumbnail_selector) {
                (Some(dir), Some(sel)) => {
                    let path = dir.join(thumbnail_name(&platform.name, rank));
                    capture(browser, sheet, &tab, &format!("{item} {sel}"), &path, log).await
                }
                _ => None,
            };

            videos.push(VideoEntry {
                platform: platform.name.clone(),
                rank,
                title,
                views: parse_views(&raw_views),
                raw_views,
                url: platform.link_url.clone(),
                thumbnail,
            });
        }
    }

    close_tab(browser, &tab).await;
    Ok(videos)
}

/// Scroll the loader (or a deep item) into view to trigger lazy loading.
async fn load_more<B: Browser>(browser: &B, tab: &str, platform: &VideoPlatform) {
    for round in 0..platform.scroll_rounds {
        let scrolled = match &platform.scroll_selector {
            Some(sel) => browser.scroll_to(tab, sel).await.is_ok(),
            None => false,
        };
        if !scrolled {
            let deep = nth(&platform.item_selector, "n", (round + 1) * 10);
            if let Err(e) = browser.scroll_to(tab, &deep).await {
                debug!(%tab, round, error = %e, "scroll failed");
            }
        }
        pause(platform.scroll_settle_ms).await;
    }
}

/// Whether any of the next [`LOOK_AHEAD`] items has a title.
async fn gap_continues<B, F>(browser: &B, tab: &str, n: u32, title_at: &F) -> bool
where
    B: Browser,
    F: Fn(u32) -> String,
{
    for ahead in 1..=LOOK_AHEAD {
        if !read_text(browser, tab, &title_at(n + ahead)).await.trim().is_empty() {
            return true;
        }
    }
    false
}

/// Screenshot an element and save it through the spreadsheet host.
async fn capture<B: Browser, T: HostTransport>(
    browser: &B,
    sheet: &Spreadsheet<T>,
    tab: &str,
    selector: &str,
    path: &Path,
    log: &mut StepLog,
) -> Option<String> {
    let image = match browser.element_screenshot(tab, selector).await {
        Ok(image) if !image.is_empty() => image,
        Ok(_) => return None,
        Err(e) => {
            debug!(selector, error = %e, "no thumbnail");
            return None;
        }
    };
    let file = path.to_string_lossy().into_owned();
    match sheet.save_base64_image(&file, &image).await {
        Ok(()) => Some(file),
        Err(e) => {
            log.record(StepStage::Host, format!("thumbnail {file}"), &e);
            None
        }
    }
}

fn thumbnail_name(platform: &str, rank: u32) -> PathBuf {
    let slug: String = platform
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect();
    PathBuf::from(format!("{slug}_{rank}.png"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::SilentProgress;
    use crate::workflows::testing::{host, temp_dir};

    fn tube() -> VideoPlatform {
        VideoPlatform {
            name: "Tube".into(),
            search_url: "https://tube.test/results?q={query}".into(),
            ready_selector: "vid".into(),
            ready_timeout_ms: 10,
            scroll_selector: Some("loader".into()),
            scroll_rounds: 2,
            section_selector: Some("sec:nth-of-type({s})".into()),
            max_sections: 2,
            item_selector: "vid:nth-of-type({n})".into(),
            max_scan: 6,
            title_selector: "#title".into(),
            views_selector: "#views".into(),
            thumbnail_selector: Some("img".into()),
            link_url: "https://tube.test".into(),
            max_items: 10,
            ..Default::default()
        }
    }

    fn nico() -> VideoPlatform {
        VideoPlatform {
            name: "Nico".into(),
            search_url: "https://nico.test/search/{query}".into(),
            item_selector: ".item:nth-of-type({n})".into(),
            max_scan: 3,
            max_items: 3,
            ..Default::default()
        }
    }

    fn test_config() -> VideosConfig {
        VideosConfig {
            topic: "Floorp".into(),
            output_file: "videos.xlsx".into(),
            sheet: "Sheet1".into(),
            platforms: vec![tube(), nico()],
            capture_thumbnails: true,
            thumbnail_dir: "thumbs".into(),
            thumbnail: Placement {
                left: 100.0,
                top: 20.0,
                width: 40.0,
                height: 25.0,
            },
            row_step: 15.0,
        }
    }

    #[test]
    fn thumbnail_names_are_slugged() {
        assert_eq!(thumbnail_name("You Tube!", 3), PathBuf::from("youtube_3.png"));
    }

    #[tokio::test]
    async fn end_to_end_with_gaps_and_thumbnails() {
        let (transport, browser) = host();
        let sheet = Spreadsheet::new(transport.clone());
        transport
            .fail_when("floorp.createTab", "nico.test", "tab refused")
            .fail_when("floorp.tabScrollTo", "loader", "no loader")
            .respond_when(
                "floorp.tabElementText",
                "sec:nth-of-type(1) vid:nth-of-type(1) #title",
                r#"{"text":"First video"}"#,
            )
            .respond_when(
                "floorp.tabElementText",
                "sec:nth-of-type(1) vid:nth-of-type(1) #views",
                r#"{"text":"1.2万回視聴"}"#,
            )
            .respond_when(
                "floorp.tabElementText",
                "sec:nth-of-type(1) vid:nth-of-type(3) #title",
                r#"{"text":"Third  video"}"#,
            )
            .respond_when(
                "floorp.tabElementText",
                "sec:nth-of-type(1) vid:nth-of-type(3) #views",
                r#"{"text":"3.4k views"}"#,
            )
            .respond_when(
                "floorp.tabElementScreenshot",
                "vid:nth-of-type(1) img",
                r#"{"image":"aGVsbG8="}"#,
            );

        let dir = temp_dir("videos");
        let outcome = run(&browser, &sheet, &test_config(), &dir, &SilentProgress).await;

        assert!(outcome.ok, "{outcome:?}");
        assert_eq!(outcome.counts["videos"], 2);
        assert_eq!(outcome.counts["thumbnails"], 1);
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].subject, "Nico");

        // Loader missing: every round falls back to a deep item.
        let scrolls = transport.calls_to("floorp.tabScrollTo");
        assert_eq!(scrolls.len(), 4);
        assert_eq!(scrolls[1].args[1], json!("vid:nth-of-type(10)"));

        let write = &transport.calls_to("excel.writeRange")[0];
        let rows: Vec<Vec<Value>> = serde_json::from_str(write.args[3].as_str().unwrap()).unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0][0], json!("Platform"));
        assert_eq!(
            rows[1],
            vec![
                json!("Tube"),
                json!(1),
                json!(""),
                json!("First video"),
                json!(12000),
                json!("1.2万回視聴"),
                json!("https://tube.test"),
            ]
        );
        assert_eq!(rows[2][1], json!(2));
        assert_eq!(rows[2][3], json!("Third video"));
        assert_eq!(rows[2][4], json!(3400));

        let saved = &transport.calls_to("excel.saveBase64Image")[0];
        assert!(saved.args[0].as_str().unwrap().ends_with("tube_1.png"));
        assert_eq!(saved.args[1], json!("aGVsbG8="));

        let picture = &transport.calls_to("excel.insertPicture")[0];
        assert_eq!(picture.args[3]["top"], json!(20.0));
        assert_eq!(picture.args[3]["left"], json!(100.0));

        assert_eq!(transport.calls_to("floorp.destroyTabInstance").len(), 1);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn nothing_found_is_a_failed_run() {
        let (transport, browser) = host();
        let sheet = Spreadsheet::new(transport.clone());
        let config = VideosConfig {
            platforms: vec![nico()],
            capture_thumbnails: false,
            ..test_config()
        };

        let dir = temp_dir("videos-empty");
        let outcome = run(&browser, &sheet, &config, &dir, &SilentProgress).await;

        assert!(!outcome.ok);
        assert_eq!(outcome.message, "No videos collected");
        assert!(transport.calls_to("excel.writeRange").is_empty());
        let _ = std::fs::remove_dir_all(&dir);
    }
}
