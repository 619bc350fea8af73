use std::path::Path;
use std::sync::Mutex;

use anyhow::Context;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;

use super::{Classifier, ScanLabel};

/// ONNX Runtime backend for the pre-trained dementia-stage model.
///
/// The session is created once from the model artifact and then only read;
/// the mutex exists because `Session::run` takes `&mut self`.
pub struct OnnxClassifier {
    session: Mutex<Session>,
    input_name: String,
    output_name: String,
}

impl OnnxClassifier {
    pub fn load(model_path: &Path) -> anyhow::Result<Self> {
        let session = Session::builder()
            .and_then(|b| b.commit_from_file(model_path))
            .with_context(|| format!("load model artifact {}", model_path.display()))?;

        let input_name = session
            .inputs
            .first()
            .map(|i| i.name.clone())
            .context("model has no inputs")?;
        let output_name = session
            .outputs
            .first()
            .map(|o| o.name.clone())
            .context("model has no outputs")?;

        tracing::info!(
            model = %model_path.display(),
            input = %input_name,
            output = %output_name,
            "classifier model loaded"
        );

        Ok(Self {
            session: Mutex::new(session),
            input_name,
            output_name,
        })
    }
}

impl Classifier for OnnxClassifier {
    fn predict(&self, input: &Array4<f32>) -> anyhow::Result<Vec<f64>> {
        let tensor = TensorRef::from_array_view(input.view()).context("convert input tensor")?;
        let inputs = ort::inputs![self.input_name.as_str() => tensor];

        let mut session = self
            .session
            .lock()
            .map_err(|_| anyhow::anyhow!("classifier session poisoned"))?;
        let outputs = session.run(inputs).context("onnx forward pass")?;

        let (shape, data) = outputs[self.output_name.as_str()]
            .try_extract_tensor::<f32>()
            .context("extract output tensor")?;

        // Expect [1, 4] (or a flat [4]); take the single batch row.
        let class_count = ScanLabel::ALL.len();
        if data.len() < class_count {
            anyhow::bail!(
                "model output shape {:?} does not cover {} classes",
                shape,
                class_count
            );
        }
        Ok(data[..class_count].iter().map(|&p| f64::from(p)).collect())
    }
}
