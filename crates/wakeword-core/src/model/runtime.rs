//! Model runtime
//!
//! Owns the model bytes, a fixed-size tensor arena and an interpreter for
//! one model. The interpreter itself comes from a [`Backend`], which keeps
//! the detector independent of any particular inference engine: tests plug
//! in scripted interpreters, the `tflite` feature plugs in TensorFlow Lite.

use super::schema;
use crate::error::{Result, WakeWordError};

/// One instantiated model, ready to run inference
///
/// Implementations read `input` (exactly [`Interpreter::input_len`] values)
/// and fill `output` (exactly [`Interpreter::output_len`] values).
pub trait Interpreter: Send {
    /// Number of f32 values in the input tensor
    fn input_len(&self) -> usize;

    /// Number of f32 values in the output tensor
    fn output_len(&self) -> usize;

    /// Run one forward pass
    fn invoke(&mut self, input: &[f32], output: &mut [f32]) -> Result<()>;
}

/// Factory that turns validated model bytes into an [`Interpreter`]
pub trait Backend: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    /// Parse the model and resolve its operators
    ///
    /// # Errors
    /// `NotSupported` if this backend cannot run models at all,
    /// `InvalidModel` if the graph cannot be instantiated.
    fn build(&self, model: &[u8]) -> Result<Box<dyn Interpreter>>;
}

/// Backend of builds without an inference engine
///
/// Every build attempt fails with `NotSupported`, which leaves the detector
/// without a model (and usable in test mode).
#[derive(Debug, Default, Clone, Copy)]
pub struct UnsupportedBackend;

impl Backend for UnsupportedBackend {
    fn name(&self) -> &'static str {
        "unsupported"
    }

    fn build(&self, _model: &[u8]) -> Result<Box<dyn Interpreter>> {
        tracing::warn!("No inference backend compiled in; enable the `tflite` feature");
        Err(WakeWordError::NotSupported)
    }
}

/// The best backend this build was compiled with
pub fn default_backend() -> Box<dyn Backend> {
    #[cfg(feature = "tflite")]
    {
        Box::new(super::tflite::TfliteBackend::default())
    }
    #[cfg(not(feature = "tflite"))]
    {
        Box::new(UnsupportedBackend)
    }
}

/// Fixed working memory for the input and output tensors
///
/// Allocated once at model load. The budget is in bytes, like the arena
/// of an embedded interpreter; tensors that do not fit are an allocation
/// failure, never a reallocation.
///
/// The arena bounds only the runtime's own copies of the input and output
/// tensors. Memory a [`Backend`] allocates internally (the TFLite
/// interpreter's graph and scratch buffers) is outside this budget.
#[derive(Debug)]
pub struct TensorArena {
    data: Vec<f32>,
    size_bytes: usize,
    input_len: usize,
    output_len: usize,
}

impl TensorArena {
    /// Reserve `size_bytes` of working memory
    pub fn allocate(size_bytes: usize) -> Result<Self> {
        if size_bytes == 0 {
            return Err(WakeWordError::InvalidArgument(
                "tensor arena size must be non-zero".to_string(),
            ));
        }

        let slots = size_bytes / std::mem::size_of::<f32>();
        let mut data = Vec::new();
        data.try_reserve_exact(slots).map_err(|_| {
            WakeWordError::NoMemory(format!("tensor arena of {} bytes", size_bytes))
        })?;
        data.resize(slots, 0.0);

        Ok(Self {
            data,
            size_bytes,
            input_len: 0,
            output_len: 0,
        })
    }

    /// Place the input and output tensors in the arena
    pub fn bind(&mut self, input_len: usize, output_len: usize) -> Result<()> {
        let needed = input_len.saturating_add(output_len);
        if needed > self.data.len() {
            return Err(WakeWordError::NoMemory(format!(
                "tensor allocation failed: {} bytes needed, arena holds {}",
                needed * std::mem::size_of::<f32>(),
                self.size_bytes
            )));
        }
        self.input_len = input_len;
        self.output_len = output_len;
        Ok(())
    }

    pub fn size_bytes(&self) -> usize {
        self.size_bytes
    }

    pub fn input(&self) -> &[f32] {
        &self.data[..self.input_len]
    }

    pub fn output(&self) -> &[f32] {
        &self.data[self.input_len..self.input_len + self.output_len]
    }

    /// Input and output tensors, borrowed together
    pub fn tensors_mut(&mut self) -> (&mut [f32], &mut [f32]) {
        let (input, rest) = self.data.split_at_mut(self.input_len);
        (input, &mut rest[..self.output_len])
    }
}

/// A loaded model with its interpreter and arena
///
/// A `ModelRuntime` only exists once the model validated, the arena was
/// allocated and the tensors were placed, so inference never runs on a
/// partially initialized runtime.
pub struct ModelRuntime {
    model: Vec<u8>,
    arena: TensorArena,
    interpreter: Box<dyn Interpreter>,
    backend: &'static str,
    schema_version: u32,
}

impl std::fmt::Debug for ModelRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelRuntime")
            .field("model_size", &self.model.len())
            .field("arena_size", &self.arena.size_bytes())
            .field("input_len", &self.input_len())
            .field("output_len", &self.output_len())
            .field("backend", &self.backend)
            .finish()
    }
}

impl ModelRuntime {
    /// Load a model into a fresh runtime
    ///
    /// # Arguments
    /// * `model` - Serialized model; the runtime keeps ownership for its lifetime
    /// * `arena_size` - Working memory budget in bytes
    /// * `backend` - Inference engine used to instantiate the model
    ///
    /// # Errors
    /// * `InvalidArgument` - empty model or zero arena
    /// * `InvalidModel` - bad header or schema version mismatch
    /// * `NoMemory` - the arena cannot be reserved or the tensors do not fit
    /// * whatever the backend reports when building the interpreter
    pub fn create(model: Vec<u8>, arena_size: usize, backend: &dyn Backend) -> Result<Self> {
        if model.is_empty() {
            return Err(WakeWordError::InvalidArgument("model is empty".to_string()));
        }
        if arena_size == 0 {
            return Err(WakeWordError::InvalidArgument(
                "tensor arena size must be non-zero".to_string(),
            ));
        }

        let schema_version = schema::validate(&model).map_err(|e| {
            tracing::error!(error = %e, "Rejected model");
            e
        })?;

        let mut arena = TensorArena::allocate(arena_size)?;
        let interpreter = backend.build(&model)?;
        arena.bind(interpreter.input_len(), interpreter.output_len())?;

        tracing::info!(
            backend = backend.name(),
            model_size = model.len(),
            arena_size,
            input_len = interpreter.input_len(),
            output_len = interpreter.output_len(),
            "Model runtime initialized"
        );

        Ok(Self {
            model,
            arena,
            interpreter,
            backend: backend.name(),
            schema_version,
        })
    }

    /// Run inference on one feature vector
    ///
    /// Copies `min(input.len(), input_len)` values into the input tensor.
    /// Slots past a short input keep whatever the previous call left there.
    /// Copies `min(output_len, output.len())` values out.
    ///
    /// # Returns
    /// Number of output values written
    ///
    /// # Errors
    /// `NotSupported` passes through from the backend untouched; any other
    /// interpreter failure becomes `InferenceFailed`.
    pub fn invoke(&mut self, input: &[f32], output: &mut [f32]) -> Result<usize> {
        let (tensor_in, tensor_out) = self.arena.tensors_mut();

        let n_in = input.len().min(tensor_in.len());
        tensor_in[..n_in].copy_from_slice(&input[..n_in]);

        match self.interpreter.invoke(tensor_in, tensor_out) {
            Ok(()) => {}
            Err(e @ (WakeWordError::NotSupported | WakeWordError::InvalidState)) => {
                return Err(e)
            }
            Err(WakeWordError::InferenceFailed(msg)) => {
                tracing::error!(error = %msg, "Model invoke failed");
                return Err(WakeWordError::InferenceFailed(msg));
            }
            Err(e) => {
                tracing::error!(error = %e, "Model invoke failed");
                return Err(WakeWordError::InferenceFailed(e.to_string()));
            }
        }

        let n_out = tensor_out.len().min(output.len());
        output[..n_out].copy_from_slice(&tensor_out[..n_out]);
        Ok(n_out)
    }

    pub fn input_len(&self) -> usize {
        self.arena.input().len()
    }

    pub fn output_len(&self) -> usize {
        self.arena.output().len()
    }

    /// Current contents of the input tensor
    pub fn input_tensor(&self) -> &[f32] {
        self.arena.input()
    }

    /// A runtime only exists once fully initialized
    pub fn is_initialized(&self) -> bool {
        !self.model.is_empty()
    }

    pub fn model_size(&self) -> usize {
        self.model.len()
    }

    pub fn arena_size(&self) -> usize {
        self.arena.size_bytes()
    }

    pub fn schema_version(&self) -> u32 {
        self.schema_version
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::schema::header_only_model;

    /// Sums the input into output[0] and echoes input[0] into output[1]
    struct SumInterpreter {
        input_len: usize,
        output_len: usize,
    }

    impl Interpreter for SumInterpreter {
        fn input_len(&self) -> usize {
            self.input_len
        }

        fn output_len(&self) -> usize {
            self.output_len
        }

        fn invoke(&mut self, input: &[f32], output: &mut [f32]) -> Result<()> {
            output[0] = input.iter().sum();
            if output.len() > 1 {
                output[1] = input[0];
            }
            Ok(())
        }
    }

    struct SumBackend {
        input_len: usize,
        output_len: usize,
    }

    impl Backend for SumBackend {
        fn name(&self) -> &'static str {
            "sum"
        }

        fn build(&self, _model: &[u8]) -> Result<Box<dyn Interpreter>> {
            Ok(Box::new(SumInterpreter {
                input_len: self.input_len,
                output_len: self.output_len,
            }))
        }
    }

    fn runtime(input_len: usize, output_len: usize) -> ModelRuntime {
        ModelRuntime::create(
            header_only_model(3),
            4096,
            &SumBackend {
                input_len,
                output_len,
            },
        )
        .unwrap()
    }

    #[test]
    fn test_create_rejects_bad_arguments() {
        let backend = SumBackend {
            input_len: 4,
            output_len: 2,
        };
        assert!(matches!(
            ModelRuntime::create(Vec::new(), 4096, &backend),
            Err(WakeWordError::InvalidArgument(_))
        ));
        assert!(matches!(
            ModelRuntime::create(header_only_model(3), 0, &backend),
            Err(WakeWordError::InvalidArgument(_))
        ));
        assert!(matches!(
            ModelRuntime::create(header_only_model(4), 4096, &backend),
            Err(WakeWordError::InvalidModel(_))
        ));
    }

    #[test]
    fn test_unsupported_backend() {
        let result = ModelRuntime::create(header_only_model(3), 4096, &UnsupportedBackend);
        assert!(matches!(result, Err(WakeWordError::NotSupported)));
    }

    #[test]
    fn test_arena_too_small_for_tensors() {
        let backend = SumBackend {
            input_len: 40,
            output_len: 4,
        };
        // 40 + 4 floats need 176 bytes
        let result = ModelRuntime::create(header_only_model(3), 128, &backend);
        match result {
            Err(WakeWordError::NoMemory(msg)) => assert!(msg.contains("tensor allocation failed")),
            other => panic!("expected NoMemory, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_invoke_full_input() {
        let mut rt = runtime(3, 2);
        let mut out = [0.0f32; 4];
        let written = rt.invoke(&[1.0, 2.0, 3.0], &mut out).unwrap();
        assert_eq!(written, 2);
        assert_eq!(out, [6.0, 1.0, 0.0, 0.0]);
    }

    #[test]
    fn test_short_input_keeps_stale_slots() {
        let mut rt = runtime(3, 1);
        let mut out = [0.0f32; 1];
        rt.invoke(&[1.0, 2.0, 3.0], &mut out).unwrap();

        rt.invoke(&[10.0], &mut out).unwrap();
        assert_eq!(rt.input_tensor(), &[10.0, 2.0, 3.0]);
        assert_eq!(out[0], 15.0);
    }

    #[test]
    fn test_long_input_is_truncated() {
        let mut rt = runtime(2, 1);
        let mut out = [0.0f32; 1];
        rt.invoke(&[1.0, 2.0, 100.0], &mut out).unwrap();
        assert_eq!(out[0], 3.0);
    }

    #[test]
    fn test_output_truncated_to_caller_buffer() {
        let mut rt = runtime(2, 2);
        let mut out = [0.0f32; 1];
        assert_eq!(rt.invoke(&[4.0, 5.0], &mut out).unwrap(), 1);
        assert_eq!(out[0], 9.0);
    }

    #[test]
    fn test_arena_regions() {
        let mut arena = TensorArena::allocate(64).unwrap();
        arena.bind(3, 2).unwrap();
        {
            let (input, output) = arena.tensors_mut();
            assert_eq!(input.len(), 3);
            assert_eq!(output.len(), 2);
            input.copy_from_slice(&[1.0, 2.0, 3.0]);
            output.copy_from_slice(&[7.0, 8.0]);
        }
        assert_eq!(arena.input(), &[1.0, 2.0, 3.0]);
        assert_eq!(arena.output(), &[7.0, 8.0]);
        assert!(arena.bind(16, 1).is_err());
    }

    #[test]
    fn test_arena_counts_only_runtime_tensors() {
        let backend = SumBackend {
            input_len: 40,
            output_len: 2,
        };
        // (40 + 2) * 4 bytes, with nothing reserved for the backend
        let rt = ModelRuntime::create(header_only_model(3), 168, &backend).unwrap();
        assert_eq!(rt.arena_size(), 168);
        assert!(matches!(
            ModelRuntime::create(header_only_model(3), 167, &backend),
            Err(WakeWordError::NoMemory(_))
        ));
    }

    #[test]
    fn test_accessors() {
        let rt = runtime(40, 4);
        assert_eq!(rt.input_len(), 40);
        assert_eq!(rt.output_len(), 4);
        assert_eq!(rt.model_size(), 24);
        assert_eq!(rt.arena_size(), 4096);
        assert_eq!(rt.schema_version(), 3);
        assert_eq!(rt.backend_name(), "sum");
        assert!(rt.is_initialized());
    }
}
