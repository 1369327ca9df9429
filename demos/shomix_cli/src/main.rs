use argh::FromArgs;
use std::path::{Path, PathBuf};

use shomix::{
    blend::MasterImage,
    composite::ChannelSlot,
    config::SessionConfig,
    image::{Image, ImageSize},
    MixingSession, RunStatus,
};

#[derive(FromArgs)]
/// Mix narrowband and broadband channels into an RGB composite
struct Args {
    /// path to the sulfur II channel
    #[argh(option, short = 's')]
    sulfur: Option<PathBuf>,

    /// path to the hydrogen alpha channel
    #[argh(option)]
    hydrogen: Option<PathBuf>,

    /// path to the oxygen III channel
    #[argh(option, short = 'o')]
    oxygen: Option<PathBuf>,

    /// path to the nitrogen II channel
    #[argh(option, short = 'n')]
    nitrogen: Option<PathBuf>,

    /// path to the broadband red channel
    #[argh(option)]
    red: Option<PathBuf>,

    /// path to the broadband green channel
    #[argh(option)]
    green: Option<PathBuf>,

    /// path to the broadband blue channel
    #[argh(option)]
    blue: Option<PathBuf>,

    /// path to the luminance layer
    #[argh(option, short = 'l')]
    luminance: Option<PathBuf>,

    /// master images to synthesize the luminance from, two or three
    #[argh(option, short = 'm')]
    master: Vec<PathBuf>,

    /// path to a JSON session configuration
    #[argh(option, short = 'c')]
    config: Option<PathBuf>,

    /// path to a coefficient file to load
    #[argh(option)]
    coefficients: Option<PathBuf>,

    /// path to save the coefficients to
    #[argh(option)]
    save_coefficients: Option<PathBuf>,

    /// remove pink star halos after mixing
    #[argh(switch)]
    pink_halos: bool,

    /// path to the output image
    #[argh(option)]
    output: PathBuf,
}

fn read_channel(path: &Path) -> Result<Image<f32, 1>, Box<dyn std::error::Error>> {
    let gray = image::open(path)?.to_luma16();
    let size = ImageSize {
        width: gray.width() as usize,
        height: gray.height() as usize,
    };
    let gray = Image::<u16, 1>::new(size, gray.into_raw())?;
    Ok(gray.cast_and_scale(1.0 / 65535.0)?)
}

fn read_master(path: &Path) -> Result<MasterImage, Box<dyn std::error::Error>> {
    let img = image::open(path)?;
    let size = ImageSize {
        width: img.width() as usize,
        height: img.height() as usize,
    };
    let master = if img.color().has_color() {
        let rgb = Image::<u16, 3>::new(size, img.to_rgb16().into_raw())?;
        MasterImage::Rgb(rgb.cast_and_scale(1.0 / 65535.0)?)
    } else {
        MasterImage::Gray(read_channel(path)?)
    };
    Ok(master)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let args: Args = argh::from_env();

    let config = match &args.config {
        Some(path) => SessionConfig::from_json(&std::fs::read_to_string(path)?)?,
        None => SessionConfig::default(),
    };

    // read the bound channels
    let inputs = [
        (ChannelSlot::Sulfur, &args.sulfur),
        (ChannelSlot::Hydrogen, &args.hydrogen),
        (ChannelSlot::Oxygen, &args.oxygen),
        (ChannelSlot::Nitrogen, &args.nitrogen),
        (ChannelSlot::Red, &args.red),
        (ChannelSlot::Green, &args.green),
        (ChannelSlot::Blue, &args.blue),
        (ChannelSlot::Luminance, &args.luminance),
    ];
    let mut channels = Vec::new();
    for (slot, path) in inputs {
        if let Some(path) = path {
            log::info!("reading {} from {}", slot, path.display());
            channels.push((slot, read_channel(path)?));
        }
    }

    let masters = args
        .master
        .iter()
        .map(|path| read_master(path))
        .collect::<Result<Vec<_>, _>>()?;

    let size = match (channels.first(), masters.first()) {
        (Some((_, img)), _) => img.size(),
        (None, Some(MasterImage::Gray(img))) => img.size(),
        (None, Some(MasterImage::Rgb(img))) => img.size(),
        (None, None) => return Err("no input channel given".into()),
    };

    let mut session = MixingSession::new(size, config)?;
    for (slot, img) in channels {
        session.bind(slot, img)?;
    }

    if let Some(path) = &args.coefficients {
        session.load_matrix(path)?;
    }

    if !masters.is_empty() {
        session.synthesize_luminance(&masters)?;
    }

    let status = if session.channels().get(ChannelSlot::Luminance).is_some() {
        session.mix_with_luminance()?
    } else {
        session.mix_channels()?
    };
    if status == RunStatus::Ignored {
        return Err("mixing was ignored".into());
    }

    if args.pink_halos {
        session.remove_pink_halos()?;
    }

    if let Some(path) = &args.save_coefficients {
        session.save_matrix(path)?;
    }

    // write the composite as seen through its display curve
    let rendered = session.display().render(session.backend())?;
    let buffer = image::Rgb32FImage::from_raw(
        size.width as u32,
        size.height as u32,
        rendered.into_vec(),
    )
    .ok_or("composite buffer does not match its size")?;
    image::DynamicImage::ImageRgb32F(buffer)
        .to_rgb16()
        .save(&args.output)?;

    log::info!("composite written to {}", args.output.display());

    Ok(())
}
