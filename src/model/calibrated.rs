//! Forest model composed with an optional probability calibrator.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use ndarray::ArrayView2;

use super::forest::{ForestModel, CALIBRATOR, FOREST_VERSION};
use crate::calibration::{calibrator_registry, Calibrator};
use crate::error::{Error, Result};
use crate::io::{negotiate, write_nested, LoaderRegistry, ModelHeader, ModelReader, ModelWriter, Persist, VersionInfo};
use crate::utils::run_with_threads;

/// Predictor that scores with a [`ForestModel`] and, when a calibrator is
/// attached, maps scores to probabilities.
///
/// Raw scores never depend on the calibrator. A value of this type is only
/// ever returned fully built: training and loading stage every part locally
/// and construct the model last.
#[derive(Debug)]
pub struct CalibratedModel {
    base: ForestModel,
    calibrator: Option<Box<dyn Calibrator>>,
}

impl CalibratedModel {
    pub fn new(base: ForestModel, calibrator: Option<Box<dyn Calibrator>>) -> Self {
        Self { base, calibrator }
    }

    pub fn uncalibrated(base: ForestModel) -> Self {
        Self::new(base, None)
    }

    pub fn base(&self) -> &ForestModel {
        &self.base
    }

    pub fn calibrator(&self) -> Option<&dyn Calibrator> {
        self.calibrator.as_deref()
    }

    pub fn has_calibrator(&self) -> bool {
        self.calibrator.is_some()
    }

    pub fn into_parts(self) -> (ForestModel, Option<Box<dyn Calibrator>>) {
        (self.base, self.calibrator)
    }

    // =========================================================================
    // Scoring
    // =========================================================================

    /// Raw ensemble score of one row.
    #[inline]
    pub fn score(&self, features: &[f32]) -> f32 {
        self.base.predict_row(features)
    }

    /// Calibrated probability of one row.
    ///
    /// # Errors
    ///
    /// [`Error::UnsupportedOperation`] if no calibrator is attached.
    pub fn probability(&self, features: &[f32]) -> Result<f32> {
        let calibrator = self.require_calibrator()?;
        Ok(calibrator.probability(self.score(features)))
    }

    /// Raw scores for every row of `features` (rows = documents).
    ///
    /// `n_threads`: 0 = auto, 1 = sequential, >1 = exact count.
    pub fn score_batch(&self, features: ArrayView2<'_, f32>, n_threads: usize) -> Vec<f32> {
        run_with_threads(n_threads, |parallelism| {
            parallelism.maybe_par_map(0..features.nrows(), |i| {
                let row = features.row(i);
                match row.as_slice() {
                    Some(values) => self.score(values),
                    None => self.score(&row.to_vec()),
                }
            })
        })
    }

    /// Calibrated probabilities for every row of `features`.
    pub fn probability_batch(&self, features: ArrayView2<'_, f32>, n_threads: usize) -> Result<Vec<f32>> {
        let calibrator = self.require_calibrator()?;
        let mut scores = self.score_batch(features, n_threads);
        scores.iter_mut().for_each(|s| *s = calibrator.probability(*s));
        Ok(scores)
    }

    fn require_calibrator(&self) -> Result<&dyn Calibrator> {
        self.calibrator()
            .ok_or(Error::UnsupportedOperation("probability requires a calibrator"))
    }

    // =========================================================================
    // Persistence
    // =========================================================================

    /// Save in the current format.
    pub fn save<W: Write>(&self, sink: W) -> Result<()> {
        self.save_as_version(sink, FOREST_VERSION.written)
    }

    /// Save stamped with an older `version`, omitting fields it lacks.
    ///
    /// # Errors
    ///
    /// [`Error::IncompatibleVersion`] if `version` is outside the negotiable
    /// range; [`Error::InvalidInput`] if the model uses something `version`
    /// cannot store. Nothing is written in either case.
    pub fn save_as_version<W: Write>(&self, mut sink: W, version: u32) -> Result<()> {
        negotiate(version, &FOREST_VERSION)?;
        self.base.check_expressible(version)?;
        if self.has_calibrator() && !CALIBRATOR.is_present(version) {
            return Err(Error::invalid_input(format!(
                "format version {version:#010x} cannot store a calibrator (introduced in {:#010x})",
                CALIBRATOR.introduced
            )));
        }

        let mut buf = Vec::new();
        let mut writer = ModelWriter::new(&mut buf);
        ModelHeader::stamped(&FOREST_VERSION, version).write(&mut writer)?;
        self.write_body(&mut writer, version)?;
        sink.write_all(&buf)?;
        sink.flush()?;
        tracing::debug!(
            version,
            bytes = buf.len(),
            calibrated = self.has_calibrator(),
            "saved model"
        );
        Ok(())
    }

    /// Load a model, resolving a nested calibrator through the built-in
    /// calibrator registry.
    pub fn load<R: Read>(source: R) -> Result<Self> {
        Self::load_with_registry(source, calibrator_registry())
    }

    /// Load a model, resolving a nested calibrator through `registry`.
    pub fn load_with_registry<R: Read>(mut source: R, registry: &LoaderRegistry<dyn Calibrator>) -> Result<Self> {
        let mut reader = ModelReader::new(&mut source);
        let header = ModelHeader::read_expecting(&mut reader, &FOREST_VERSION)?;
        let model = Self::read_body(&mut reader, &header, registry)?;
        tracing::debug!(
            version = header.written,
            n_trees = model.base.ensemble().n_trees(),
            calibrated = model.has_calibrator(),
            "loaded model"
        );
        Ok(model)
    }

    /// Decode a body whose header has already been checked.
    pub fn read_body(
        reader: &mut ModelReader<'_>,
        header: &ModelHeader,
        registry: &LoaderRegistry<dyn Calibrator>,
    ) -> Result<Self> {
        let version = header.written;
        let base = ForestModel::read_fields(reader, version)?;
        let calibrator = if CALIBRATOR.is_present(version) && reader.read_bool()? {
            Some(registry.load_nested(reader)?)
        } else {
            None
        };
        Ok(Self { base, calibrator })
    }

    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let file = File::create(path)?;
        self.save(BufWriter::new(file))
    }

    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        Self::load(BufReader::new(file))
    }
}

impl Persist for CalibratedModel {
    fn version_info(&self) -> &'static VersionInfo {
        &FOREST_VERSION
    }

    fn write_body(&self, writer: &mut ModelWriter<'_>, version: u32) -> Result<()> {
        self.base.write_fields(writer, version)?;
        if CALIBRATOR.is_present(version) {
            writer.write_bool(self.has_calibrator())?;
            if let Some(calibrator) = self.calibrator() {
                write_nested(writer, calibrator)?;
            }
        }
        Ok(())
    }
}
