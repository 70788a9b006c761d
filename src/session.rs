//! Headless filter execution: stored filter data in, pixels and filter data out.

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::catalog::{CatalogLookup, FilterDefinition};
use crate::config::BridgeConfig;
use crate::error::FilterError;
use crate::filter_data::{decode, encode, join_arguments, EncodedFilterBuffer};
use crate::region::{
    copy_planar_region, write_back_planar_region, InputMode, InterleavedImage, LayerExtent,
    LayerHost, NormalizedRegion, PlanarImage, RegionResolver,
};

/// How chatty the engine should be. Ordered from quietest to loudest.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum OutputMessageMode {
    #[default]
    Quiet,
    VerboseLayerName,
    VerboseConsole,
    VerboseLogFile,
    VeryVerboseConsole,
    VeryVerboseLogFile,
    DebugConsole,
    DebugLogFile,
}

impl OutputMessageMode {
    /// Leading engine option selecting this verbosity.
    pub fn verbosity_flag(self) -> &'static str {
        match self {
            Self::Quiet => "-v -",
            Self::VerboseLayerName | Self::VerboseConsole | Self::VerboseLogFile => "-v -99",
            Self::VeryVerboseConsole | Self::VeryVerboseLogFile => "-v 0",
            Self::DebugConsole | Self::DebugLogFile => "-debug",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct EngineFault {
    pub message: String,
}

impl EngineFault {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<EngineFault> for FilterError {
    fn from(fault: EngineFault) -> Self {
        Self::Engine(fault.message)
    }
}

/// The image processing engine a command line is handed to.
///
/// Images are replaced or mutated in place; the first image left in the list
/// is the result.
pub trait CommandEngine {
    fn run(&mut self, command_line: &str, images: &mut Vec<PlanarImage>) -> Result<(), EngineFault>;
}

impl LayerHost for InterleavedImage {
    fn layers_extent(&self, mode: InputMode) -> LayerExtent {
        match mode {
            InputMode::NoInput => LayerExtent::new(0, 0),
            _ => self.extent(),
        }
    }
}

/// Outcome of [`FilterSession::run`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionReport {
    /// False when the engine returned no image and the host buffer was kept.
    pub written: bool,
    pub width: usize,
    pub height: usize,
    pub spectrum: usize,
    pub command_line: String,
    #[serde(skip)]
    pub filter_data: EncodedFilterBuffer,
}

/// One host session. Owns its region cache and borrows the catalog text.
#[derive(Debug)]
pub struct FilterSession<'a> {
    catalog: &'a str,
    language: Option<String>,
    message_mode: OutputMessageMode,
    image_scale: f32,
    input_mode: InputMode,
    resolver: RegionResolver,
}

impl<'a> FilterSession<'a> {
    pub fn new(catalog: &'a str) -> Self {
        Self {
            catalog,
            language: None,
            message_mode: OutputMessageMode::Quiet,
            image_scale: 1.0,
            input_mode: InputMode::Active,
            resolver: RegionResolver::new(),
        }
    }

    pub fn from_config(catalog: &'a str, config: &BridgeConfig) -> Self {
        Self::new(catalog)
            .with_language(config.language.clone())
            .with_message_mode(config.output_message_mode)
            .with_image_scale(config.image_scale)
    }

    pub fn with_language(mut self, language: Option<String>) -> Self {
        self.language = language;
        self
    }

    pub fn with_message_mode(mut self, mode: OutputMessageMode) -> Self {
        self.message_mode = mode;
        self
    }

    pub fn with_image_scale(mut self, scale: f32) -> Self {
        self.image_scale = scale;
        self
    }

    pub fn with_input_mode(mut self, mode: InputMode) -> Self {
        self.input_mode = mode;
        self
    }

    pub fn lookup(&self) -> CatalogLookup<'a> {
        CatalogLookup::new(self.catalog, self.language.as_deref())
    }

    /// Find the filter named by stored filter data and load its values.
    pub fn definition_from_filter_data(
        &self,
        bytes: &[u8],
        length: usize,
    ) -> Result<FilterDefinition, FilterError> {
        let decoded = decode(bytes, length);
        let mut definition = self.lookup().find(&decoded.identity)?;
        definition
            .parameters
            .apply_ordered_values(&decoded.values)?;
        debug!(
            "loaded {} value(s) into '{}'",
            decoded.values.len(),
            decoded.identity.name
        );
        Ok(definition)
    }

    pub fn command_line<S: AsRef<str>>(&self, command: &str, values: &[S]) -> String {
        format!(
            "{} _IMAGE_SCALE={} -{} {}",
            self.message_mode.verbosity_flag(),
            self.image_scale,
            command,
            join_arguments(values)
        )
    }

    /// Command line running `definition` with its current values.
    pub fn command_line_for(&self, definition: &FilterDefinition) -> String {
        self.command_line(
            &definition.parameters.identity.command,
            &definition.parameters.to_ordered_values(),
        )
    }

    /// Run the filter stored in `bytes` over `image`.
    ///
    /// The whole image of the session's input mode goes to the engine, and the
    /// first image it leaves behind is written back over `image` from the
    /// origin. On error `image` is left untouched.
    pub fn run<E: CommandEngine + ?Sized>(
        &mut self,
        bytes: &[u8],
        length: usize,
        image: &mut InterleavedImage,
        engine: &mut E,
    ) -> Result<ExecutionReport, FilterError> {
        let decoded = decode(bytes, length);
        let filter_data = encode(&decoded.identity, &decoded.values)?;
        let command_line = self.command_line(&decoded.identity.command, &decoded.values);

        self.resolver.clear_cache();
        let rect = self
            .resolver
            .resolve(NormalizedRegion::ENTIRE_IMAGE, self.input_mode, &*image);
        // An empty selection still hands the engine one (empty) image.
        let mut images = vec![copy_planar_region(image, rect)];

        if self.message_mode > OutputMessageMode::Quiet {
            info!("command: {command_line}");
        } else {
            debug!("command: {command_line}");
        }
        if let Err(fault) = engine.run(&command_line, &mut images) {
            warn!("engine failed running '{command_line}': {fault}");
            return Err(fault.into());
        }

        let Some(output) = images.first() else {
            debug!("engine returned no image; host buffer kept");
            return Ok(ExecutionReport {
                written: false,
                width: 0,
                height: 0,
                spectrum: 0,
                command_line,
                filter_data,
            });
        };
        if let Err(error) = write_back_planar_region(output, image) {
            warn!("engine output for '{command_line}' rejected: {error}");
            return Err(FilterError::Engine(format!("malformed output image: {error}")));
        }
        Ok(ExecutionReport {
            written: true,
            width: output.width,
            height: output.height,
            spectrum: output.spectrum,
            command_line,
            filter_data,
        })
    }
}

/// Encode a definition's identity with its current values.
pub fn filter_data_from_definition(
    definition: &FilterDefinition,
) -> Result<EncodedFilterBuffer, FilterError> {
    encode(
        &definition.parameters.identity,
        &definition.parameters.to_ordered_values(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter_data::FilterIdentity;

    const CATALOG: &str = "#@gui Smooth : fx_smooth, fx_smooth_preview\n\
        #@gui : Radius = int(3,1,10), Amount = float(0.5,0,1)\n\
        #@gui : Tint = color(255,0,0)\n";

    #[derive(Default)]
    struct RecordingEngine {
        seen: Vec<(String, usize, usize, usize)>,
        fail: bool,
        output: Option<Vec<PlanarImage>>,
    }

    impl CommandEngine for RecordingEngine {
        fn run(
            &mut self,
            command_line: &str,
            images: &mut Vec<PlanarImage>,
        ) -> Result<(), EngineFault> {
            let first = &images[0];
            self.seen.push((
                command_line.to_owned(),
                first.width,
                first.height,
                first.spectrum,
            ));
            if self.fail {
                return Err(EngineFault::new("unknown command"));
            }
            match self.output.take() {
                Some(output) => *images = output,
                None => {
                    for sample in &mut images[0].data {
                        *sample = 1.0 - *sample;
                    }
                }
            }
            Ok(())
        }
    }

    fn stored(values: &[&str]) -> EncodedFilterBuffer {
        encode(
            &FilterIdentity::new("Smooth", "fx_smooth", "fx_smooth_preview"),
            values,
        )
        .expect("encode should succeed")
    }

    #[test]
    fn verbosity_prefix_follows_message_mode() {
        let cases = [
            (OutputMessageMode::Quiet, "-v -"),
            (OutputMessageMode::VerboseLayerName, "-v -99"),
            (OutputMessageMode::VerboseLogFile, "-v -99"),
            (OutputMessageMode::VeryVerboseConsole, "-v 0"),
            (OutputMessageMode::DebugLogFile, "-debug"),
        ];
        for (mode, prefix) in cases {
            let session = FilterSession::new("").with_message_mode(mode);
            let line = session.command_line("fx_smooth", &["3"]);
            assert_eq!(line, format!("{prefix} _IMAGE_SCALE=1 -fx_smooth 3"));
        }
    }

    #[test]
    fn image_scale_is_printed_compactly() {
        let session = FilterSession::new("").with_image_scale(0.5);
        assert_eq!(
            session.command_line("fx", &["1", "0.25", "\"t\""]),
            "-v - _IMAGE_SCALE=0.5 -fx 1,0.25,\"t\""
        );
        assert_eq!(
            session.command_line::<&str>("fx", &[]),
            "-v - _IMAGE_SCALE=0.5 -fx "
        );
    }

    #[test]
    fn definition_is_loaded_from_filter_data() {
        let buffer = stored(&["7", "0.25", "0,255,0"]);
        let session = FilterSession::new(CATALOG);
        let definition = session
            .definition_from_filter_data(buffer.as_bytes(), buffer.len())
            .expect("definition should load");
        assert_eq!(
            definition.parameters.to_ordered_values(),
            vec!["7", "0.25", "0,255,0"]
        );
        assert_eq!(
            session.command_line_for(&definition),
            "-v - _IMAGE_SCALE=1 -fx_smooth 7,0.25,0,255,0"
        );

        let again = filter_data_from_definition(&definition).expect("encode should succeed");
        assert_eq!(again, buffer);
    }

    #[test]
    fn missing_values_are_a_mismatch() {
        let buffer = stored(&["7"]);
        let error = FilterSession::new(CATALOG)
            .definition_from_filter_data(buffer.as_bytes(), buffer.len())
            .expect_err("too few values should fail");
        assert!(matches!(error, FilterError::Mismatch { .. }));
    }

    #[test]
    fn unterminated_last_value_still_loads() {
        let buffer = stored(&["7", "0.25", "0,255,0"]);
        let bytes = &buffer.as_bytes()[..buffer.len() - 1];
        let definition = FilterSession::new(CATALOG)
            .definition_from_filter_data(bytes, bytes.len())
            .expect("exact length should keep the last value");
        assert_eq!(
            definition.parameters.to_ordered_values(),
            vec!["7", "0.25", "0,255,0"]
        );
    }

    #[test]
    fn unknown_filter_is_not_found() {
        let buffer = encode(&FilterIdentity::new("Nope", "fx_nope", "fx_nope"), &["1"])
            .expect("encode should succeed");
        let error = FilterSession::new(CATALOG)
            .definition_from_filter_data(buffer.as_bytes(), buffer.len())
            .expect_err("unknown filter should fail");
        assert!(matches!(error, FilterError::NotFound { .. }));
    }

    #[test]
    fn run_passes_whole_image_and_writes_result_back() {
        let buffer = stored(&["3", "0.5", "255,0,0"]);
        let mut image = InterleavedImage::from_data(2, 1, 2, vec![0.0, 0.25, 0.5, 1.0])
            .expect("sizes should match");
        let mut engine = RecordingEngine::default();
        let report = FilterSession::new(CATALOG)
            .run(buffer.as_bytes(), buffer.len(), &mut image, &mut engine)
            .expect("run should succeed");

        assert_eq!(
            engine.seen,
            vec![(
                "-v - _IMAGE_SCALE=1 -fx_smooth 3,0.5,255,0,0".to_owned(),
                2,
                1,
                2
            )]
        );
        assert!(report.written);
        assert_eq!((report.width, report.height, report.spectrum), (2, 1, 2));
        assert_eq!(image.data, vec![1.0, 0.75, 0.5, 0.0]);
        assert_eq!(report.filter_data, buffer);
    }

    #[test]
    fn larger_output_is_clamped_to_the_host_buffer() {
        let buffer = stored(&[]);
        let mut image = InterleavedImage::new(1, 1, 1);
        let mut engine = RecordingEngine {
            output: Some(vec![PlanarImage::from_data(2, 2, 1, vec![9.0, 8.0, 7.0, 6.0])
                .expect("sizes should match")]),
            ..RecordingEngine::default()
        };
        let report = FilterSession::new(CATALOG)
            .run(buffer.as_bytes(), buffer.len(), &mut image, &mut engine)
            .expect("run should succeed");
        assert_eq!((report.width, report.height), (2, 2));
        assert_eq!(image.data, vec![9.0]);
    }

    #[test]
    fn malformed_engine_output_is_a_fault_and_image_kept() {
        let buffer = stored(&[]);
        let mut image = InterleavedImage::from_data(2, 2, 1, vec![4.0; 4])
            .expect("sizes should match");
        let mut engine = RecordingEngine {
            output: Some(vec![PlanarImage {
                width: 2,
                height: 2,
                spectrum: 1,
                data: vec![1.0],
            }]),
            ..RecordingEngine::default()
        };
        let error = FilterSession::new(CATALOG)
            .run(buffer.as_bytes(), buffer.len(), &mut image, &mut engine)
            .expect_err("short engine output should fail");
        assert!(matches!(error, FilterError::Engine(_)));
        assert_eq!(image.data, vec![4.0; 4]);
    }

    #[test]
    fn engine_fault_leaves_host_buffer_untouched() {
        let buffer = stored(&["3"]);
        let mut image = InterleavedImage::from_data(1, 1, 3, vec![0.1, 0.2, 0.3])
            .expect("sizes should match");
        let mut engine = RecordingEngine {
            fail: true,
            ..RecordingEngine::default()
        };
        let error = FilterSession::new(CATALOG)
            .run(buffer.as_bytes(), buffer.len(), &mut image, &mut engine)
            .expect_err("engine fault should surface");
        assert_eq!(error, FilterError::Engine("unknown command".to_owned()));
        assert_eq!(image.data, vec![0.1, 0.2, 0.3]);
    }

    #[test]
    fn no_input_hands_the_engine_one_empty_image() {
        let buffer = stored(&["3"]);
        let mut image = InterleavedImage::new(4, 4, 3);
        let mut engine = RecordingEngine::default();
        FilterSession::new(CATALOG)
            .with_input_mode(InputMode::NoInput)
            .run(buffer.as_bytes(), buffer.len(), &mut image, &mut engine)
            .expect("run should succeed");
        let (_, width, height, spectrum) = &engine.seen[0];
        assert_eq!((*width, *height, *spectrum), (0, 0, 0));
    }

    #[test]
    fn engine_returning_nothing_keeps_host_buffer() {
        let buffer = stored(&["3"]);
        let mut image = InterleavedImage::from_data(1, 1, 1, vec![0.4]).expect("sizes should match");
        let mut engine = RecordingEngine {
            output: Some(Vec::new()),
            ..RecordingEngine::default()
        };
        let report = FilterSession::new(CATALOG)
            .run(buffer.as_bytes(), buffer.len(), &mut image, &mut engine)
            .expect("run should succeed");
        assert!(!report.written);
        assert_eq!(image.data, vec![0.4]);
    }
}
