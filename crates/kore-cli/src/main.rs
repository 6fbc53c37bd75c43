use std::ops::Deref;
use std::path::{Path, PathBuf};

use clap::Parser;
use tracing_subscriber::EnvFilter;

use kore_cudnn::context::version_triple;
use kore_cudnn::ffi::CUDNN_DILATION_MIN_VERSION;
use kore_cudnn::{
    cudnn_api, tensor_format, ConvolutionConfig, CudnnApi, CudnnError, DataLayout, DataType,
    FilterConfig, LoaderConfig, PoolingConfig, PoolingMode, ScopedConvolutionDescriptor,
    ScopedFilterDescriptor, ScopedPoolingDescriptor, ScopedTensorDescriptor, TensorConfig,
};

const BANNER: &str = r#"
 _  _____  ____  _____
| |/ / _ \|  _ \| ____|
| ' / | | | |_) |  _|
| . \ |_| |  _ <| |___
|_|\_\___/|_| \_\_____|"#;

#[derive(Parser)]
#[command(
    name = "kore-dnn",
    about = "Kore cuDNN descriptor checker",
    long_about = "Check which cuDNN library Kore will load and dry-run tensor, filter,\n\
                  convolution and pooling descriptor configuration against it.",
    version,
)]
struct Cli {
    /// Extra directory searched for the cuDNN library before the system path
    #[arg(long, global = true)]
    cudnn_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Show which cuDNN library is loaded and its version
    Info,
    /// Configure a tensor descriptor
    Tensor {
        /// Tensor extents, e.g. 8,64,32,32
        #[arg(long, value_delimiter = ',', required = true)]
        dims: Vec<i32>,
        /// Memory layout: nchw, nhwc
        #[arg(long, default_value = "nchw")]
        layout: DataLayout,
        /// Element type: f32, f64, f16, bf16, i8, i32, u8
        #[arg(long, default_value = "f32")]
        dtype: DataType,
        /// Convolution groups (divides the channel axis)
        #[arg(long, default_value = "1")]
        groups: i32,
    },
    /// Configure a filter descriptor (MCHW)
    Filter {
        /// Filter extents, e.g. 64,32,3,3
        #[arg(long, value_delimiter = ',', required = true)]
        kernel: Vec<i32>,
        #[arg(long, default_value = "nchw")]
        layout: DataLayout,
        #[arg(long, default_value = "f32")]
        dtype: DataType,
        /// Convolution groups (divides the output channel axis)
        #[arg(long, default_value = "1")]
        groups: i32,
    },
    /// Configure a convolution descriptor
    Conv {
        #[arg(long, value_delimiter = ',', required = true, allow_negative_numbers = true)]
        pads: Vec<i32>,
        #[arg(long, value_delimiter = ',', required = true)]
        strides: Vec<i32>,
        /// Defaults to 1 along every spatial axis
        #[arg(long, value_delimiter = ',')]
        dilations: Option<Vec<i32>>,
        /// Compute type
        #[arg(long, default_value = "f32")]
        dtype: DataType,
    },
    /// Configure a pooling descriptor
    Pool {
        /// Window extents, e.g. 2,2
        #[arg(long, value_delimiter = ',', required = true)]
        kernel: Vec<i32>,
        #[arg(long, value_delimiter = ',', required = true, allow_negative_numbers = true)]
        pads: Vec<i32>,
        #[arg(long, value_delimiter = ',', required = true)]
        strides: Vec<i32>,
        /// max or avg
        #[arg(long, default_value = "max")]
        mode: PoolingMode,
    },
}

/// The library a command runs against: an explicitly opened one or the
/// process-wide instance.
enum Api {
    Owned(CudnnApi),
    Global(&'static CudnnApi),
}

impl Deref for Api {
    type Target = CudnnApi;

    fn deref(&self) -> &CudnnApi {
        match self {
            Api::Owned(api) => api,
            Api::Global(api) => *api,
        }
    }
}

/// Open cuDNN. An explicit `--cudnn-dir` must load; otherwise absence is not an error.
fn open(dir: Option<&Path>) -> Result<Option<Api>, CudnnError> {
    match dir {
        Some(dir) => {
            tracing::debug!("opening cuDNN with extra search dir {}", dir.display());
            let config = LoaderConfig::from_env().with_dir(dir);
            Ok(Some(Api::Owned(CudnnApi::load(&config)?)))
        }
        None => Ok(cudnn_api().map(Api::Global)),
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    let dir = cli.cudnn_dir.as_deref();

    let result = match cli.command {
        Commands::Info => cmd_info(dir),
        Commands::Tensor { dims, layout, dtype, groups } => {
            cmd_tensor(dir, &dims, layout, dtype, groups)
        }
        Commands::Filter { kernel, layout, dtype, groups } => {
            cmd_filter(dir, &kernel, layout, dtype, groups)
        }
        Commands::Conv { pads, strides, dilations, dtype } => {
            let dilations = dilations.unwrap_or_else(|| vec![1; pads.len()]);
            cmd_conv(dir, &pads, &strides, &dilations, dtype)
        }
        Commands::Pool { kernel, pads, strides, mode } => {
            cmd_pool(dir, &kernel, &pads, &strides, mode)
        }
    };

    if let Err(e) = result {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}

fn cmd_info(dir: Option<&Path>) -> Result<(), CudnnError> {
    println!("{}", BANNER);
    println!("  v{}  -  cuDNN descriptors\n", env!("CARGO_PKG_VERSION"));

    println!("Platform");
    println!("  OS:   {}", std::env::consts::OS);
    println!("  Arch: {}", std::env::consts::ARCH);

    let mut config = LoaderConfig::from_env();
    if let Some(dir) = dir {
        config = config.with_dir(dir);
    }
    println!("\nSearch order");
    for path in config.candidates() {
        println!("  {}", path.display());
    }

    println!("\ncuDNN");
    match CudnnApi::load(&config) {
        Ok(api) => {
            let (major, minor, patch) = version_triple(api.version());
            println!("  Loaded:   [x] {}", api.path().display());
            println!("  Version:  {}.{}.{} ({})", major, minor, patch, api.version());
            println!(
                "  Dilation: {}",
                if api.version() >= CUDNN_DILATION_MIN_VERSION { "[x]" } else { "[ ]" }
            );
        }
        Err(e) => {
            println!("  Loaded:   [ ]");
            println!("  Reason:   {}", e);
        }
    }
    Ok(())
}

fn cmd_tensor(
    dir: Option<&Path>,
    dims: &[i32],
    layout: DataLayout,
    dtype: DataType,
    groups: i32,
) -> Result<(), CudnnError> {
    let config = TensorConfig::new(tensor_format(layout)?, dtype, dims, groups)?;
    println!("Tensor descriptor");
    println!("  format:  {:?}", config.format());
    println!("  dtype:   {}", config.dtype());
    println!("  dims:    {:?}", config.dims());
    println!("  strides: {:?}", config.strides());
    println!("  groups:  {}", config.groups());

    match open(dir)? {
        Some(api) => {
            let mut desc = ScopedTensorDescriptor::new(&*api)?;
            let raw = desc.apply(config)?;
            println!("\ncuDNN {} accepted descriptor {:p}", api.version(), raw);
        }
        None => println!("\ncuDNN not loadable, configuration checked locally only"),
    }
    Ok(())
}

fn cmd_filter(
    dir: Option<&Path>,
    kernel: &[i32],
    layout: DataLayout,
    dtype: DataType,
    groups: i32,
) -> Result<(), CudnnError> {
    let config = FilterConfig::new(tensor_format(layout)?, dtype, kernel, groups)?;
    println!("Filter descriptor");
    println!("  format:  {:?}", config.format());
    println!("  dtype:   {}", config.dtype());
    println!("  dims:    {:?}", config.dims());
    println!("  groups:  {}", config.groups());

    match open(dir)? {
        Some(api) => {
            let mut desc = ScopedFilterDescriptor::new(&*api)?;
            let raw = desc.apply(config)?;
            println!("\ncuDNN {} accepted descriptor {:p}", api.version(), raw);
        }
        None => println!("\ncuDNN not loadable, configuration checked locally only"),
    }
    Ok(())
}

fn cmd_conv(
    dir: Option<&Path>,
    pads: &[i32],
    strides: &[i32],
    dilations: &[i32],
    dtype: DataType,
) -> Result<(), CudnnError> {
    let api = open(dir)?;
    // Without a library, check against a version that supports dilation.
    let version = api
        .as_ref()
        .map(|api| api.version())
        .unwrap_or(CUDNN_DILATION_MIN_VERSION);
    let config = ConvolutionConfig::new(dtype, pads, strides, dilations, version)?;
    println!("Convolution descriptor");
    println!("  mode:      {:?}", config.mode());
    println!("  compute:   {}", config.compute_type());
    println!("  pads:      {:?}", config.pads());
    println!("  strides:   {:?}", config.strides());
    println!("  dilations: {:?}", config.dilations());

    match api {
        Some(api) => {
            let mut desc = ScopedConvolutionDescriptor::new(&*api)?;
            let raw = desc.apply(config)?;
            println!("\ncuDNN {} accepted descriptor {:p}", api.version(), raw);
        }
        None => println!("\ncuDNN not loadable, configuration checked locally only"),
    }
    Ok(())
}

fn cmd_pool(
    dir: Option<&Path>,
    kernel: &[i32],
    pads: &[i32],
    strides: &[i32],
    mode: PoolingMode,
) -> Result<(), CudnnError> {
    let config = PoolingConfig::new(mode, kernel, pads, strides)?;
    println!("Pooling descriptor");
    println!("  mode:    {}", config.mode());
    println!("  nan:     {:?}", config.nan_propagation());
    println!("  window:  {:?}", config.kernel());
    println!("  pads:    {:?}", config.pads());
    println!("  strides: {:?}", config.strides());

    match open(dir)? {
        Some(api) => {
            let mut desc = ScopedPoolingDescriptor::new(&*api)?;
            let raw = desc.apply(config)?;
            println!("\ncuDNN {} accepted descriptor {:p}", api.version(), raw);
        }
        None => println!("\ncuDNN not loadable, configuration checked locally only"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_tensor() {
        let cli = Cli::try_parse_from([
            "kore-dnn", "tensor", "--dims", "8,64,32,32", "--layout", "nhwc", "--dtype", "f16",
            "--groups", "4",
        ])
        .unwrap();
        match cli.command {
            Commands::Tensor { dims, layout, dtype, groups } => {
                assert_eq!(dims, vec![8, 64, 32, 32]);
                assert_eq!(layout, DataLayout::Nhwc);
                assert_eq!(dtype, DataType::Half);
                assert_eq!(groups, 4);
            }
            _ => panic!("expected tensor command"),
        }
    }

    #[test]
    fn test_parse_conv_defaults() {
        let cli = Cli::try_parse_from([
            "kore-dnn", "conv", "--pads", "1,1", "--strides", "2,2", "--cudnn-dir", "/opt/cudnn",
        ])
        .unwrap();
        assert_eq!(cli.cudnn_dir, Some(PathBuf::from("/opt/cudnn")));
        match cli.command {
            Commands::Conv { pads, dilations, dtype, .. } => {
                assert_eq!(pads, vec![1, 1]);
                assert!(dilations.is_none());
                assert_eq!(dtype, DataType::Float);
            }
            _ => panic!("expected conv command"),
        }
    }

    #[test]
    fn test_parse_rejects_bad_layout() {
        let bad_layout = ["kore-dnn", "tensor", "--dims", "1,2", "--layout", "hwcn"];
        assert!(Cli::try_parse_from(bad_layout).is_err());
        let bad_mode = [
            "kore-dnn", "pool", "--kernel", "2", "--pads", "0", "--strides", "1", "--mode", "min",
        ];
        assert!(Cli::try_parse_from(bad_mode).is_err());
    }
}
