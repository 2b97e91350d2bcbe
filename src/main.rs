//! cardpress CLI - render a card document into texture PNGs

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::Parser;

use cardpress::{
    CardPress, CardPressConfig, CardPressError, ChannelSet, MarkdownInput, PipelineResult,
};

#[derive(Parser)]
#[command(name = "cardpress")]
#[command(version)]
#[command(about = "Paginate a markdown-like document into cards and render texture channels", long_about = None)]
struct Cli {
    /// Document file, `-` for stdin. Defaults to `content.md` in the asset root
    #[arg(value_name = "FILE")]
    input: Option<PathBuf>,

    /// Output directory
    #[arg(short, long, value_name = "DIR")]
    output: PathBuf,

    /// JSON config file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Directory images and textures are resolved against. Defaults to the
    /// input file's directory
    #[arg(long, value_name = "DIR")]
    assets: Option<PathBuf>,

    /// Font file, optionally as `FAMILY=FILE`
    #[arg(long = "font", value_name = "FILE")]
    fonts: Vec<String>,

    /// Directory of .ttf/.otf fonts. Defaults to `font/` in the asset root
    /// when no fonts are given
    #[arg(long = "font-dir", value_name = "DIR")]
    font_dirs: Vec<PathBuf>,

    /// Device pixel ratio
    #[arg(long)]
    dpr: Option<f32>,

    #[arg(long)]
    width: Option<f32>,

    #[arg(long)]
    height: Option<f32>,

    #[arg(long)]
    padding: Option<f32>,

    #[arg(long)]
    gap: Option<f32>,

    /// Use the textured paper channel preset
    #[arg(long)]
    paper: bool,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let level = match cli.verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), CardPressError> {
    let mut config = match &cli.config {
        Some(path) => CardPressConfig::from_path(path)?,
        None => CardPressConfig::default(),
    };
    apply_overrides(&mut config, &cli);
    config.validate()?;

    let mut builder = CardPress::builder().config(&config);
    for font in &cli.fonts {
        builder = match font.split_once('=') {
            Some((family, path)) => builder.register_font_as(path.trim(), family.trim()),
            None => builder.register_font_file(font),
        };
    }
    for dir in &cli.font_dirs {
        builder = builder.register_font_dir(dir);
    }
    let engine = builder.build()?;
    log::info!("registered {} fonts", engine.font_count());

    let markdown = match cli.input.as_deref() {
        Some(path) if path == Path::new("-") => {
            let mut text = String::new();
            std::io::stdin().read_to_string(&mut text)?;
            MarkdownInput::Inline(text)
        }
        Some(path) => MarkdownInput::Inline(std::fs::read_to_string(path)?),
        None => MarkdownInput::Source("content.md".to_string()),
    };

    let request = engine.request(markdown);
    let result = engine.render(&request)?;
    log::info!(
        "rendered {} cards at {}x{} px",
        result.card_count(),
        (request.geometry.width * request.device_pixel_ratio).ceil(),
        (request.geometry.height * request.device_pixel_ratio).ceil()
    );
    let written = write_outputs(&result, &cli.output)?;
    println!("wrote {written} files to {}", cli.output.display());
    Ok(())
}

fn apply_overrides(config: &mut CardPressConfig, cli: &Cli) {
    if let Some(dpr) = cli.dpr {
        config.device_pixel_ratio = dpr;
    }
    if let Some(width) = cli.width {
        config.geometry.width = width;
    }
    if let Some(height) = cli.height {
        config.geometry.height = height;
    }
    if let Some(padding) = cli.padding {
        config.geometry.padding = padding;
    }
    if let Some(gap) = cli.gap {
        config.geometry.gap = gap;
    }
    if let Some(assets) = &cli.assets {
        config.asset_root = Some(assets.clone());
    }
    if cli.paper {
        config.channels = ChannelSet::paper();
    }
    let asset_root = config
        .asset_root
        .get_or_insert_with(|| default_asset_root(cli.input.as_deref()))
        .clone();
    let no_fonts = config.fonts.is_empty()
        && config.font_dirs.is_empty()
        && cli.fonts.is_empty()
        && cli.font_dirs.is_empty();
    if no_fonts {
        config.font_dirs.push(asset_root.join("font"));
    }
}

/// Directory holding the input document, or the working directory for
/// stdin and the default `content.md`.
fn default_asset_root(input: Option<&Path>) -> PathBuf {
    match input {
        Some(path) if path != Path::new("-") => match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        },
        _ => PathBuf::from("."),
    }
}

fn write_outputs(result: &PipelineResult, output: &Path) -> Result<usize, CardPressError> {
    std::fs::create_dir_all(output)?;
    let mut written = 0;
    for card in &result.cards {
        for (channel, buffer) in &card.channels {
            let path = output.join(format!("card-{}-{channel}.png", card.index));
            std::fs::write(&path, buffer.encode_png()?)?;
            log::debug!("wrote {}", path.display());
            written += 1;
        }
    }
    for (channel, buffer) in &result.default_channels {
        let path = output.join(format!("default-{channel}.png"));
        std::fs::write(&path, buffer.encode_png()?)?;
        written += 1;
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn overrides(args: &[&str]) -> CardPressConfig {
        let cli = Cli::parse_from(["cardpress", "-o", "out"].iter().copied().chain(args.iter().copied()));
        let mut config = CardPressConfig::default();
        apply_overrides(&mut config, &cli);
        config
    }

    #[test]
    fn asset_root_defaults_to_the_input_directory() {
        let config = overrides(&["docs/deck/cards.md"]);
        assert_eq!(config.asset_root, Some(PathBuf::from("docs/deck")));
        assert_eq!(config.font_dirs, vec![PathBuf::from("docs/deck/font")]);

        assert_eq!(overrides(&["cards.md"]).asset_root, Some(PathBuf::from(".")));
        assert_eq!(overrides(&["-"]).asset_root, Some(PathBuf::from(".")));
        assert_eq!(overrides(&[]).asset_root, Some(PathBuf::from(".")));
    }

    #[test]
    fn explicit_assets_and_fonts_win() {
        let config = overrides(&["--assets", "shared", "--font-dir", "fonts", "docs/cards.md"]);
        assert_eq!(config.asset_root, Some(PathBuf::from("shared")));
        assert!(config.font_dirs.is_empty());

        let config = overrides(&["--assets", "shared", "docs/cards.md"]);
        assert_eq!(config.font_dirs, vec![PathBuf::from("shared/font")]);
    }
}
