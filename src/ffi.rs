//! Host capability table
//!
//! Demo modules import their math intrinsics from the host instead of
//! linking a libm. The capability table maps import names to host functions
//! and is consulted once, at instantiation time, for every function the
//! module declares under the `env` namespace. Names no source defines bind
//! to a logging stub so that modules probing for optional host functions
//! still instantiate.

use std::collections::HashSet;

use anyhow::Result;
use wasmtime::{ExternType, FuncType, HeapType, Linker, Module, Val, ValType};

/// Import namespace the capability table serves.
pub const ENV_NAMESPACE: &str = "env";

/// A host function in one of the shapes demo modules import.
#[derive(Debug, Clone, Copy)]
pub enum HostFn {
    /// `(f32) -> f32`
    F32ToF32(fn(f32) -> f32),
    /// `(f32, f32) -> f32`
    F32F32ToF32(fn(f32, f32) -> f32),
}

impl HostFn {
    /// Whether this function's shape matches the signature a module
    /// declared for the import.
    fn matches(&self, ty: &FuncType) -> bool {
        let param_count = match self {
            HostFn::F32ToF32(_) => 1,
            HostFn::F32F32ToF32(_) => 2,
        };
        ty.params().len() == param_count
            && ty.params().all(|p| matches!(p, ValType::F32))
            && ty.results().len() == 1
            && ty.results().all(|r| matches!(r, ValType::F32))
    }

    fn register(self, linker: &mut Linker<()>, name: &str) -> Result<()> {
        match self {
            HostFn::F32ToF32(f) => linker.func_wrap(ENV_NAMESPACE, name, f)?,
            HostFn::F32F32ToF32(f) => linker.func_wrap(ENV_NAMESPACE, name, f)?,
        };
        Ok(())
    }
}

/// One name→function mapping consulted during resolution.
pub struct CapabilitySource {
    entries: Vec<(&'static str, HostFn)>,
}

impl CapabilitySource {
    pub fn new(entries: Vec<(&'static str, HostFn)>) -> Self {
        Self { entries }
    }

    /// Exact-match lookup within this source only.
    fn get(&self, name: &str) -> Option<HostFn> {
        self.entries
            .iter()
            .find(|(entry, _)| *entry == name)
            .map(|(_, host)| *host)
    }
}

/// Priority-ordered set of capability sources.
///
/// Immutable after construction. Resolution scans sources in the order they
/// were supplied and returns the first source that defines the name; names
/// nothing defines fall back to a [`Stub`] bound to the requested name, so
/// resolution itself never fails.
pub struct CapabilityTable {
    sources: Vec<CapabilitySource>,
}

/// Result of resolving one import name.
pub enum Binding {
    /// A capability source defines the name.
    Host(HostFn),
    /// No source defines the name; calls log and return zeroes.
    Stub(Stub),
}

impl CapabilityTable {
    pub fn new(sources: Vec<CapabilitySource>) -> Self {
        Self { sources }
    }

    /// Resolve `name` against the sources in priority order.
    pub fn resolve(&self, name: &str) -> Binding {
        for source in &self.sources {
            if let Some(host) = source.get(name) {
                return Binding::Host(host);
            }
        }
        Binding::Stub(Stub::new(name))
    }
}

/// The math intrinsics every demo module gets.
pub fn host_math() -> CapabilitySource {
    CapabilitySource::new(vec![
        ("atan2f", HostFn::F32F32ToF32(f32::atan2)),
        ("cosf", HostFn::F32ToF32(f32::cos)),
        ("sinf", HostFn::F32ToF32(f32::sin)),
        ("sqrtf", HostFn::F32ToF32(f32::sqrt)),
    ])
}

/// Stand-in for an import no capability source defines.
///
/// Calling it from the module records a diagnostic naming the symbol and the
/// exact arguments given, then returns zeroed results. It never traps, so an
/// unimplemented host call degrades to garbage data rather than aborting the
/// demo outright.
pub struct Stub {
    name: String,
}

impl Stub {
    fn new(name: &str) -> Self {
        Self { name: name.to_string() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Diagnostic line logged on every invocation.
    pub fn message(&self, args: &[Val]) -> String {
        let args: Vec<String> = args.iter().map(format_val).collect();
        format!("NOT IMPLEMENTED: {} [{}]", self.name, args.join(", "))
    }
}

fn format_val(val: &Val) -> String {
    match val {
        Val::I32(v) => v.to_string(),
        Val::I64(v) => v.to_string(),
        Val::F32(bits) => f32::from_bits(*bits).to_string(),
        Val::F64(bits) => f64::from_bits(*bits).to_string(),
        other => format!("{other:?}"),
    }
}

/// Zero value of the given type, used to fill stub results.
fn zero_val(ty: &ValType) -> Val {
    match ty {
        ValType::I32 => Val::I32(0),
        ValType::I64 => Val::I64(0),
        ValType::F32 => Val::F32(0),
        ValType::F64 => Val::F64(0),
        ValType::V128 => Val::V128(0u128.into()),
        ValType::Ref(r) => match r.heap_type().top() {
            HeapType::Func => Val::FuncRef(None),
            HeapType::Extern => Val::ExternRef(None),
            _ => Val::AnyRef(None),
        },
    }
}

/// Bind every `env` function import the module declares.
///
/// Resolved names are wired to their host functions; everything else gets a
/// logging stub matching the module's declared signature. The import section
/// may repeat a name; the linker holds one definition per name, so only the
/// first entry for a name is registered. Imports outside the `env` namespace
/// (and non-function imports) are left unbound, so a module that requires
/// them fails at instantiation.
pub fn register_imports(
    linker: &mut Linker<()>,
    module: &Module,
    table: &CapabilityTable,
) -> Result<()> {
    let mut seen: HashSet<&str> = HashSet::new();
    for import in module.imports() {
        if import.module() != ENV_NAMESPACE {
            continue;
        }
        let ExternType::Func(func_ty) = import.ty() else {
            continue;
        };
        let name = import.name();
        if !seen.insert(name) {
            continue;
        }

        match table.resolve(name) {
            Binding::Host(host) if host.matches(&func_ty) => {
                host.register(linker, name)?;
            }
            Binding::Host(_) => {
                tracing::warn!(
                    "'{}' is defined by a capability source but the module imports it \
                     with a different signature; binding stub",
                    name
                );
                register_stub(linker, func_ty, Stub::new(name))?;
            }
            Binding::Stub(stub) => {
                tracing::debug!("No capability source defines '{}'; binding stub", name);
                register_stub(linker, func_ty, stub)?;
            }
        }
    }
    Ok(())
}

fn register_stub(linker: &mut Linker<()>, ty: FuncType, stub: Stub) -> Result<()> {
    let result_types: Vec<ValType> = ty.results().collect();
    let name = stub.name().to_string();
    linker.func_new(ENV_NAMESPACE, &name, ty, move |_caller, params, results| {
        tracing::error!("{}", stub.message(params));
        for (slot, ty) in results.iter_mut().zip(&result_types) {
            *slot = zero_val(ty);
        }
        Ok(())
    })?;
    Ok(())
}
