use clap::{Arg, ArgAction, Command};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use vector_normalizer::{normalize_upload, FilterMode, UploadConfig};

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let matches = Command::new("Vector Normalizer")
        .version("1.0")
        .author("Jesper Fjellin")
        .about("Merges uploaded GeoJSON, KML, KMZ and Shapefile data (plain or archived) into one GeoJSON file")
        .arg(
            Arg::new("file")
                .short('f')
                .long("file")
                .num_args(1)
                .required(true)
                .help("Uploaded vector file or archive"),
        )
        .arg(
            Arg::new("types")
                .short('t')
                .long("types")
                .num_args(1..)
                .help("Geometry types to keep, e.g. POLYGON POINT (all when omitted)"),
        )
        .arg(
            Arg::new("max-size")
                .long("max-size")
                .num_args(1)
                .help("Maximum upload size in bytes (overrides MAX_VECTOR_FILE_SIZE)"),
        )
        .arg(
            Arg::new("temp-root")
                .long("temp-root")
                .num_args(1)
                .help("Directory for workspaces and output (overrides AOI_TEMP_ROOT)"),
        )
        .arg(
            Arg::new("skip-filtered")
                .long("skip-filtered")
                .action(ArgAction::SetTrue)
                .help("Leave out filtered features instead of writing empty placeholders"),
        )
        .get_matches();

    let mut config = match UploadConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    if let Some(max_size) = matches.get_one::<String>("max-size") {
        match max_size.parse::<u64>() {
            Ok(max_size) => config.max_file_size = max_size,
            Err(_) => {
                eprintln!("Error: Invalid maximum size: {}", max_size);
                std::process::exit(1);
            }
        }
    }
    if let Some(temp_root) = matches.get_one::<String>("temp-root") {
        config.temp_root = PathBuf::from(temp_root);
    }
    if matches.get_flag("skip-filtered") {
        config.filter_mode = FilterMode::Skip;
    }

    let file = matches
        .get_one::<String>("file")
        .map(PathBuf::from)
        .unwrap_or_default();
    if !file.exists() {
        eprintln!("Error: File not found: {}", file.display());
        std::process::exit(1);
    }

    let types: Vec<String> = matches
        .get_many::<String>("types")
        .map(|values| values.cloned().collect())
        .unwrap_or_default();

    match normalize_upload(&file, &types, config) {
        Ok(output) => {
            println!("{}", output.path.display());
            for layer in &output.layers {
                println!("  {}: {} features", layer.name, layer.feature_count);
            }
            for name in &output.unmatched {
                println!("  unmatched: {}", name);
            }
        }
        Err(e) => {
            eprintln!("Error processing upload: {}", e);
            if e.is_validation() {
                eprintln!("Supported uploads: .geojson, .kml, .kmz, shapefile sets, and zip/tar/7z archives of them.");
            }
            std::process::exit(1);
        }
    }
}
