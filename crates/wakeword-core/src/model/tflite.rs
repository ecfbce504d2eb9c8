//! TensorFlow Lite backend (`tflite` feature)

use super::runtime::{Backend, Interpreter};
use crate::error::{Result, WakeWordError};
use tflitec::interpreter::{Interpreter as TfInterpreter, Options};
use tflitec::model::Model;

fn tensor_len(shape: &tflitec::tensor::Shape) -> usize {
    shape.dimensions().iter().product()
}

/// Builds interpreters through the TensorFlow Lite C API
#[derive(Debug, Clone)]
pub struct TfliteBackend {
    thread_count: i32,
}

impl Default for TfliteBackend {
    fn default() -> Self {
        Self { thread_count: 1 }
    }
}

fn options(thread_count: i32) -> Options {
    let mut options = Options::default();
    options.thread_count = thread_count;
    options
}

impl Backend for TfliteBackend {
    fn name(&self) -> &'static str {
        "tflite"
    }

    fn build(&self, model: &[u8]) -> Result<Box<dyn Interpreter>> {
        let model_bytes = model.to_vec();

        let (input_len, output_len) = {
            let model = Model::from_bytes(&model_bytes)
                .map_err(|e| WakeWordError::InvalidModel(e.to_string()))?;
            let interpreter = TfInterpreter::new(&model, Some(options(self.thread_count)))
                .map_err(|e| WakeWordError::InvalidModel(format!("no interpreter: {}", e)))?;
            interpreter.allocate_tensors().map_err(|e| {
                WakeWordError::NoMemory(format!("tensor allocation failed: {}", e))
            })?;

            let input = interpreter
                .input(0)
                .map_err(|e| WakeWordError::InvalidModel(e.to_string()))?;
            let output = interpreter
                .output(0)
                .map_err(|e| WakeWordError::InvalidModel(e.to_string()))?;
            (tensor_len(input.shape()), tensor_len(output.shape()))
        };

        tracing::debug!(input_len, output_len, "TFLite model resolved");

        Ok(Box::new(TfliteInterpreter {
            model_bytes,
            thread_count: self.thread_count,
            input_len,
            output_len,
        }))
    }
}

/// Interpreter over an owned copy of the model
///
/// tflitec ties its interpreter to a borrowed model, so the graph is
/// instantiated from the owned bytes on each invoke. Those allocations are
/// made by TFLite and are not bounded by the runtime's [`TensorArena`].
///
/// [`TensorArena`]: super::runtime::TensorArena
// TODO: keep the interpreter alive across invokes once tflitec offers an owning Model.
struct TfliteInterpreter {
    model_bytes: Vec<u8>,
    thread_count: i32,
    input_len: usize,
    output_len: usize,
}

impl Interpreter for TfliteInterpreter {
    fn input_len(&self) -> usize {
        self.input_len
    }

    fn output_len(&self) -> usize {
        self.output_len
    }

    fn invoke(&mut self, input: &[f32], output: &mut [f32]) -> Result<()> {
        let model = Model::from_bytes(&self.model_bytes)
            .map_err(|_| WakeWordError::InvalidState)?;
        let interpreter = TfInterpreter::new(&model, Some(options(self.thread_count)))
            .map_err(|_| WakeWordError::InvalidState)?;
        interpreter
            .allocate_tensors()
            .map_err(|e| WakeWordError::InferenceFailed(format!("allocate tensors: {}", e)))?;

        interpreter
            .copy(input, 0)
            .map_err(|e| WakeWordError::InferenceFailed(format!("set input: {}", e)))?;
        interpreter
            .invoke()
            .map_err(|e| WakeWordError::InferenceFailed(e.to_string()))?;

        let tensor = interpreter
            .output(0)
            .map_err(|e| WakeWordError::InferenceFailed(format!("get output: {}", e)))?;
        let data = tensor.data::<f32>();
        let n = data.len().min(output.len());
        output[..n].copy_from_slice(&data[..n]);
        Ok(())
    }
}
