//! forge – command-line HTML → paint command converter.
//!
//! Usage:
//!   forge <input.html> [--width N] [--css FILE]... [--config FILE] [--view-source] [--tree]
//!
//! The paint command list is printed to stdout as JSON. Stylesheets linked
//! from the document are read relative to it; `data:` URLs are decoded.

use std::{env, fs, path::PathBuf, process};

use base64::{engine::general_purpose::STANDARD as BASE64_STD, Engine as _};

use page_forge::fonts::FontManager;
use page_forge::paint;
use page_forge::pipeline::{Fetcher, Page, PipelineConfig};
use page_forge::{Error, Result};

/// Reads local files and `data:` URLs.
struct FileFetcher;

impl Fetcher for FileFetcher {
    fn fetch(&self, url: &str) -> Result<String> {
        let fail = |reason: String| Error::Fetch {
            url: url.to_string(),
            reason,
        };
        if let Some(data) = url.strip_prefix("data:") {
            let (header, payload) = data
                .split_once(',')
                .ok_or_else(|| fail("data URL has no ','".to_string()))?;
            if !header.contains(";base64") {
                return Ok(payload.to_string());
            }
            let bytes = BASE64_STD
                .decode(payload.trim())
                .map_err(|e| fail(e.to_string()))?;
            return String::from_utf8(bytes).map_err(|e| fail(e.to_string()));
        }
        let path = url.strip_prefix("file://").unwrap_or(url);
        fs::read_to_string(path).map_err(|e| fail(e.to_string()))
    }
}

fn main() {
    env_logger::init();

    let args: Vec<String> = env::args().collect();

    let mut input_path: Option<PathBuf> = None;
    let mut width: Option<f32> = None;
    let mut css_paths: Vec<PathBuf> = Vec::new();
    let mut config_path: Option<PathBuf> = None;
    let mut view_source = false;
    let mut tree = false;

    let mut iter = args.iter().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--width" | "-w" => match iter.next().map(|v| v.parse::<f32>()) {
                Some(Ok(w)) if w > 0.0 => width = Some(w),
                _ => {
                    eprintln!("Error: --width needs a positive number.");
                    process::exit(1);
                }
            },
            "--css" => match iter.next() {
                Some(v) => css_paths.push(PathBuf::from(v)),
                None => {
                    eprintln!("Error: --css needs a file.");
                    process::exit(1);
                }
            },
            "--config" => match iter.next() {
                Some(v) => config_path = Some(PathBuf::from(v)),
                None => {
                    eprintln!("Error: --config needs a file.");
                    process::exit(1);
                }
            },
            "--view-source" => view_source = true,
            "--tree" => tree = true,
            "--help" | "-h" => {
                print_usage(&args[0]);
                process::exit(0);
            }
            other if other.starts_with('-') => {
                eprintln!("Unknown flag: {other}");
                print_usage(&args[0]);
                process::exit(1);
            }
            path => {
                if input_path.is_some() {
                    eprintln!("Unexpected argument: {path}");
                    print_usage(&args[0]);
                    process::exit(1);
                }
                input_path = Some(PathBuf::from(path));
            }
        }
    }

    let input = match input_path {
        Some(p) => p,
        None => {
            eprintln!("Error: no input file specified.");
            print_usage(&args[0]);
            process::exit(1);
        }
    };

    let mut config = match &config_path {
        Some(path) => match fs::read_to_string(path).map_err(|e| e.to_string()).and_then(|json| {
            PipelineConfig::from_json(&json).map_err(|e| e.to_string())
        }) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("Error reading config '{}': {e}", path.display());
                process::exit(1);
            }
        },
        None => PipelineConfig::default(),
    };
    if let Some(w) = width {
        config.viewport_width = w;
    }

    let fonts = FontManager::default();
    let url = input.to_string_lossy().into_owned();
    let mut page = if view_source {
        match FileFetcher.fetch(&url) {
            Ok(markup) => Page::view_source(&markup, config, fonts),
            Err(e) => {
                eprintln!("Error: {e}");
                process::exit(1);
            }
        }
    } else {
        match Page::load_from(&FileFetcher, &url, config, fonts) {
            Ok(page) => page,
            Err(e) => {
                eprintln!("Error: {e}");
                process::exit(1);
            }
        }
    };

    for path in &css_paths {
        match fs::read_to_string(path) {
            Ok(css) => page.add_stylesheet(&css),
            Err(e) => {
                eprintln!("Error reading '{}': {e}", path.display());
                process::exit(1);
            }
        }
    }

    if tree {
        print!("{}", page.dom());
        return;
    }

    match paint::to_json(page.display_list()) {
        Ok(json) => println!("{json}"),
        Err(e) => {
            eprintln!("Error serialising paint commands: {e}");
            process::exit(1);
        }
    }
    eprintln!(
        "{} paint command(s), content height {}px at width {}px",
        page.display_list().len(),
        page.content_height(),
        page.viewport_width()
    );
}

fn print_usage(prog: &str) {
    eprintln!("forge – HTML/CSS layout to paint commands (page-forge)");
    eprintln!();
    eprintln!("Usage:");
    eprintln!("  {prog} <input.html> [--width N] [--css FILE]... [--config FILE] [--view-source] [--tree]");
    eprintln!();
    eprintln!("Arguments:");
    eprintln!("  <input.html>    HTML file to lay out (linked stylesheets are read relative to it)");
    eprintln!();
    eprintln!("Flags:");
    eprintln!("  --width, -w     Viewport width in px (default: 800, or the config's)");
    eprintln!("  --css           Extra stylesheet applied after the document's own; repeatable");
    eprintln!("  --config        JSON pipeline configuration");
    eprintln!("  --view-source   Show the markup itself instead of rendering it");
    eprintln!("  --tree          Print the parsed, styled tree instead of paint commands");
    eprintln!("  --help          Print this message");
}
