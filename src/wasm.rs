//! WASM engine wrapper and demo module instancing

use std::path::Path;

use anyhow::{Context, Result};
use wasmtime::{Engine, Linker, Memory, Module, Store, TypedFunc};

use crate::ffi::{self, CapabilityTable};
use crate::{DISPLAY_HEIGHT, DISPLAY_WIDTH};

/// Bytes in one rendered frame (RGBA8, one byte per channel).
pub const FRAME_BYTES: usize = (DISPLAY_WIDTH * DISPLAY_HEIGHT * 4) as usize;

/// Shared WASM engine (one per application)
pub struct WasmEngine {
    engine: Engine,
}

impl WasmEngine {
    /// Create a new WASM engine with default configuration
    pub fn new() -> Result<Self> {
        let engine = Engine::default();
        Ok(Self { engine })
    }

    /// Get a reference to the underlying wasmtime engine
    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// Compile a WASM module from bytes
    pub fn load_module(&self, bytes: &[u8]) -> Result<Module> {
        Module::new(&self.engine, bytes).context("Failed to compile WASM module")
    }
}

/// Read and compile a module from disk.
///
/// One-shot: a read or compile failure propagates immediately, no retry.
pub fn load_module_file(engine: &WasmEngine, path: &Path) -> Result<Module> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("Failed to read module file: {}", path.display()))?;
    engine.load_module(&bytes)
}

/// Failure modes of one frame's render+view cycle.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The render entry point trapped or otherwise failed.
    #[error("render call failed: {0}")]
    Render(anyhow::Error),

    /// Returned offset + frame length runs past the end of linear memory.
    #[error(
        "pixel view out of bounds: offset {offset} + {len} bytes exceeds memory size {memory_size}"
    )]
    OutOfBounds {
        offset: usize,
        len: usize,
        memory_size: usize,
    },
}

/// A live demo module: owns the store, the exported linear memory, and the
/// `render` entry point.
///
/// Created once at startup and held for the rest of the session.
pub struct DemoInstance {
    store: Store<()>,
    memory: Memory,
    render: TypedFunc<f32, u32>,
}

impl DemoInstance {
    /// Instantiate `module` against the capability table.
    ///
    /// Fails if instantiation fails (e.g. a required non-`env` import) or if
    /// the module is missing the `memory` export or the
    /// `render(f32) -> u32` entry point.
    pub fn new(engine: &WasmEngine, module: &Module, table: &CapabilityTable) -> Result<Self> {
        let mut linker: Linker<()> = Linker::new(engine.engine());
        ffi::register_imports(&mut linker, module, table)?;

        let mut store = Store::new(engine.engine(), ());
        let instance = linker
            .instantiate(&mut store, module)
            .context("Failed to instantiate WASM module")?;

        let memory = instance
            .get_memory(&mut store, "memory")
            .context("Module does not export a linear memory named 'memory'")?;
        let render = instance
            .get_typed_func::<f32, u32>(&mut store, "render")
            .context("Module does not export 'render(f32) -> u32'")?;

        tracing::info!(
            "Module instantiated: {} bytes of linear memory",
            memory.data_size(&store)
        );

        Ok(Self {
            store,
            memory,
            render,
        })
    }

    /// Current size of the module's linear memory in bytes.
    pub fn memory_size(&self) -> usize {
        self.memory.data_size(&self.store)
    }

    /// Call the module's render entry point with the elapsed seconds and
    /// view the frame it produced.
    ///
    /// The module returns a byte offset into its linear memory; the view
    /// spans exactly [`FRAME_BYTES`] from that offset. An offset that would
    /// run past the end of memory is a boundary error and produces no
    /// partial view.
    pub fn render_frame(&mut self, elapsed_seconds: f32) -> Result<&[u8], FrameError> {
        let offset = self
            .render
            .call(&mut self.store, elapsed_seconds)
            .map_err(FrameError::Render)? as usize;

        let data = self.memory.data(&self.store);
        let memory_size = data.len();
        offset
            .checked_add(FRAME_BYTES)
            .and_then(|end| data.get(offset..end))
            .ok_or(FrameError::OutOfBounds {
                offset,
                len: FRAME_BYTES,
                memory_size,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ffi::host_math;

    /// 30 pages = 1,966,080 bytes, enough for one 800x600 RGBA frame.
    const TEST_PAGES: usize = 30;
    const TEST_MEMORY_SIZE: usize = TEST_PAGES * 65536;

    fn table() -> CapabilityTable {
        CapabilityTable::new(vec![host_math()])
    }

    fn instance_from_wat(wat: &str) -> Result<DemoInstance> {
        let engine = WasmEngine::new()?;
        let module = engine.load_module(&wat::parse_str(wat)?)?;
        DemoInstance::new(&engine, &module, &table())
    }

    /// Module whose render writes its elapsed argument into the start of the
    /// frame and returns offset 0.
    const ELAPSED_RECORDER: &str = r#"
        (module
            (memory (export "memory") 30)
            (func (export "render") (param f32) (result i32)
                (f32.store (i32.const 0) (local.get 0))
                i32.const 0))
    "#;

    #[test]
    fn test_load_module_file_reads_wasm_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("demo.wasm");
        std::fs::write(&path, wat::parse_str(ELAPSED_RECORDER).unwrap()).unwrap();

        let engine = WasmEngine::new().unwrap();
        let module = load_module_file(&engine, &path).unwrap();
        let instance = DemoInstance::new(&engine, &module, &table()).unwrap();
        assert_eq!(instance.memory_size(), TEST_MEMORY_SIZE);
    }

    #[test]
    fn test_load_module_file_missing_path_fails() {
        let engine = WasmEngine::new().unwrap();
        let err = load_module_file(&engine, Path::new("no/such/demo.wasm"));
        assert!(err.is_err());
    }

    #[test]
    fn test_invalid_bytes_fail_to_compile() {
        let engine = WasmEngine::new().unwrap();
        assert!(engine.load_module(b"definitely not wasm").is_err());
    }

    #[test]
    fn test_instance_requires_memory_export() {
        let wat = r#"
            (module
                (func (export "render") (param f32) (result i32)
                    i32.const 0))
        "#;
        assert!(instance_from_wat(wat).is_err());
    }

    #[test]
    fn test_instance_requires_render_export() {
        let wat = r#"(module (memory (export "memory") 30))"#;
        assert!(instance_from_wat(wat).is_err());
    }

    #[test]
    fn test_instance_requires_render_signature() {
        let wat = r#"
            (module
                (memory (export "memory") 30)
                (func (export "render") (param i64) (result i64)
                    i64.const 0))
        "#;
        assert!(instance_from_wat(wat).is_err());
    }

    #[test]
    fn test_render_frame_passes_elapsed_seconds_through() {
        let mut instance = instance_from_wat(ELAPSED_RECORDER).unwrap();
        let pixels = instance.render_frame(0.25).unwrap();
        assert_eq!(pixels.len(), FRAME_BYTES);
        let stored = f32::from_le_bytes(pixels[0..4].try_into().unwrap());
        assert_eq!(stored, 0.25);
    }

    #[test]
    fn test_render_frame_views_memory_at_returned_offset() {
        let wat = r#"
            (module
                (memory (export "memory") 30)
                (data (i32.const 16) "\ab\cd")
                (func (export "render") (param f32) (result i32)
                    i32.const 16))
        "#;
        let mut instance = instance_from_wat(wat).unwrap();
        let pixels = instance.render_frame(0.016).unwrap();
        assert_eq!(pixels.len(), FRAME_BYTES);
        assert_eq!(pixels[0], 0xab);
        assert_eq!(pixels[1], 0xcd);
    }

    #[test]
    fn test_render_frame_exact_fit_at_end_of_memory() {
        // Highest offset that still fits a whole frame
        let offset = TEST_MEMORY_SIZE - FRAME_BYTES;
        let wat = format!(
            r#"
            (module
                (memory (export "memory") 30)
                (func (export "render") (param f32) (result i32)
                    i32.const {offset}))
        "#
        );
        let mut instance = instance_from_wat(&wat).unwrap();
        assert!(instance.render_frame(0.016).is_ok());
    }

    #[test]
    fn test_render_frame_out_of_bounds_offset_fails() {
        // Offset M-1 cannot fit a frame in a memory of size M
        let offset = TEST_MEMORY_SIZE - 1;
        let wat = format!(
            r#"
            (module
                (memory (export "memory") 30)
                (func (export "render") (param f32) (result i32)
                    i32.const {offset}))
        "#
        );
        let mut instance = instance_from_wat(&wat).unwrap();
        match instance.render_frame(0.016) {
            Err(FrameError::OutOfBounds {
                offset,
                len,
                memory_size,
            }) => {
                assert_eq!(offset, TEST_MEMORY_SIZE - 1);
                assert_eq!(len, FRAME_BYTES);
                assert_eq!(memory_size, TEST_MEMORY_SIZE);
            }
            other => panic!("expected OutOfBounds, got {other:?}"),
        }
    }

    #[test]
    fn test_render_trap_is_a_render_error() {
        let wat = r#"
            (module
                (memory (export "memory") 30)
                (func (export "render") (param f32) (result i32)
                    unreachable))
        "#;
        let mut instance = instance_from_wat(wat).unwrap();
        assert!(matches!(
            instance.render_frame(0.016),
            Err(FrameError::Render(_))
        ));
    }

    #[test]
    fn test_render_frame_with_math_imports() {
        // sqrtf(4) = 2.0 stored at the frame start
        let wat = r#"
            (module
                (import "env" "sqrtf" (func $sqrtf (param f32) (result f32)))
                (memory (export "memory") 30)
                (func (export "render") (param f32) (result i32)
                    (f32.store (i32.const 0) (call $sqrtf (f32.const 4)))
                    i32.const 0))
        "#;
        let mut instance = instance_from_wat(wat).unwrap();
        let pixels = instance.render_frame(0.016).unwrap();
        let stored = f32::from_le_bytes(pixels[0..4].try_into().unwrap());
        assert_eq!(stored, 2.0);
    }
}
