//! wgpu-based GPU compute backend (Metal / Vulkan / DX12).
//!
//! Transforms are radix-2 Stockham FFTs dispatched one butterfly stage per
//! compute pass, ping-ponging between two scratch buffers that live in a
//! per-dimension plan. The y and z axes are transformed in place in the
//! Hermitian-packed grid using strided line addressing, so no transposes
//! are needed. All dimensions must therefore be powers of two; callers can
//! check with [`ComputeBackend::supports_dims`] before allocating.
//!
//! A `WgpuBackend` owns a single device queue. Concurrent deconvolution
//! runs must each create their own backend instance; sharing one across
//! runs would interleave work on the plan scratch buffers.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use bytemuck::{Pod, Zeroable};
use wgpu::util::DeviceExt;

use super::{BufferInner, ComputeBackend, DeviceBuffer, ElementKind, ZeroGuard};
use crate::error::{BackendError, BackendResult, LucidaError};
use crate::volume::VolumeDims;

// ---------------------------------------------------------------------------
// Inline WGSL shaders
// ---------------------------------------------------------------------------

/// One radix-2 Stockham butterfly stage over a batch of lines.
///
/// A line is a 1-D transform of length `n` whose elements sit `stride`
/// apart; line `b` starts at `(b % inner) + (b / inner) * outer`. With
/// `stride = inner = 1, outer = n` this walks contiguous x rows; with
/// `stride = inner = n0h, outer = n0h * n1` it walks y columns of the
/// packed spectrum grid. `direction` is the sign of the twiddle exponent:
/// -1 forward, +1 inverse (unscaled).
const FFT_STAGE_WGSL: &str = r"
struct Params {
    n: u32,
    stage: u32,
    lines: u32,
    stride: u32,
    inner: u32,
    outer: u32,
    direction: f32,
}
@group(0) @binding(0) var<storage, read>       input:  array<f32>;
@group(0) @binding(1) var<storage, read_write> output: array<f32>;
@group(0) @binding(2) var<uniform>             params: Params;

const PI: f32 = 3.14159265358979323846;

@compute @workgroup_size(256)
fn main(@builtin(global_invocation_id) gid: vec3<u32>) {
    let half = params.n / 2u;
    if gid.x >= half * params.lines { return; }

    let line = gid.x / half;
    let t = gid.x % half;
    let base = (line % params.inner) + (line / params.inner) * params.outer;

    let s = 1u << params.stage;
    let k = t % s;
    let j = (t / s) * (s * 2u) + k;

    let angle = params.direction * PI * f32(k) / f32(s);
    let w = vec2<f32>(cos(angle), sin(angle));

    let i0 = (base + t * params.stride) * 2u;
    let i1 = (base + (t + half) * params.stride) * 2u;
    let u = vec2<f32>(input[i0], input[i0 + 1u]);
    let p = vec2<f32>(input[i1], input[i1 + 1u]);
    let v = vec2<f32>(p.x * w.x - p.y * w.y, p.x * w.y + p.y * w.x);

    let o0 = (base + j * params.stride) * 2u;
    let o1 = (base + (j + s) * params.stride) * 2u;
    output[o0] = u.x + v.x;
    output[o0 + 1u] = u.y + v.y;
    output[o1] = u.x - v.x;
    output[o1 + 1u] = u.y - v.y;
}
";

const REAL_TO_COMPLEX_WGSL: &str = r"
struct Params { count: u32 }
@group(0) @binding(0) var<storage, read>       input:  array<f32>;
@group(0) @binding(1) var<storage, read_write> output: array<f32>;
@group(0) @binding(2) var<uniform>             params: Params;
@compute @workgroup_size(256)
fn main(@builtin(global_invocation_id) gid: vec3<u32>) {
    if gid.x >= params.count { return; }
    output[gid.x * 2u] = input[gid.x];
    output[gid.x * 2u + 1u] = 0.0;
}
";

/// Keep the non-redundant low half of every x row after the x-axis pass.
const PACK_SPECTRUM_WGSL: &str = r"
struct Params { width: u32, packed_width: u32, count: u32 }
@group(0) @binding(0) var<storage, read>       input:  array<f32>;
@group(0) @binding(1) var<storage, read_write> output: array<f32>;
@group(0) @binding(2) var<uniform>             params: Params;
@compute @workgroup_size(256)
fn main(@builtin(global_invocation_id) gid: vec3<u32>) {
    if gid.x >= params.count { return; }
    let row = gid.x / params.packed_width;
    let k = gid.x % params.packed_width;
    let src = (row * params.width + k) * 2u;
    output[gid.x * 2u] = input[src];
    output[gid.x * 2u + 1u] = input[src + 1u];
}
";

/// Rebuild full x rows from the packed half via conjugate symmetry.
const UNPACK_SPECTRUM_WGSL: &str = r"
struct Params { width: u32, packed_width: u32, count: u32 }
@group(0) @binding(0) var<storage, read>       input:  array<f32>;
@group(0) @binding(1) var<storage, read_write> output: array<f32>;
@group(0) @binding(2) var<uniform>             params: Params;
@compute @workgroup_size(256)
fn main(@builtin(global_invocation_id) gid: vec3<u32>) {
    if gid.x >= params.count { return; }
    let row = gid.x / params.width;
    let x = gid.x % params.width;
    if x < params.packed_width {
        let src = (row * params.packed_width + x) * 2u;
        output[gid.x * 2u] = input[src];
        output[gid.x * 2u + 1u] = input[src + 1u];
    } else {
        let src = (row * params.packed_width + (params.width - x)) * 2u;
        output[gid.x * 2u] = input[src];
        output[gid.x * 2u + 1u] = -input[src + 1u];
    }
}
";

/// Discard imaginary parts after the inverse x-axis pass. No scaling;
/// the inverse transform is unscaled by convention.
const TAKE_REAL_WGSL: &str = r"
struct Params { count: u32 }
@group(0) @binding(0) var<storage, read>       input:  array<f32>;
@group(0) @binding(1) var<storage, read_write> output: array<f32>;
@group(0) @binding(2) var<uniform>             params: Params;
@compute @workgroup_size(256)
fn main(@builtin(global_invocation_id) gid: vec3<u32>) {
    if gid.x >= params.count { return; }
    output[gid.x] = input[gid.x * 2u];
}
";

// The elementwise shaders declare every buffer read_write so that the
// output may legally alias either input: wgpu only merges duplicate
// bindings of one buffer when their usages are identical. Each thread
// reads both operands before writing, so aliased runs stay exact.

const COMPLEX_MULTIPLY_WGSL: &str = r"
struct Params { count: u32 }
@group(0) @binding(0) var<storage, read_write> a: array<f32>;
@group(0) @binding(1) var<storage, read_write> b: array<f32>;
@group(0) @binding(2) var<storage, read_write> output: array<f32>;
@group(0) @binding(3) var<uniform>             params: Params;
@compute @workgroup_size(256)
fn main(@builtin(global_invocation_id) gid: vec3<u32>) {
    if gid.x >= params.count { return; }
    let i = gid.x * 2u;
    let ar = a[i]; let ai = a[i + 1u];
    let br = b[i]; let bi = b[i + 1u];
    output[i] = ar * br - ai * bi;
    output[i + 1u] = ar * bi + ai * br;
}
";

const CONJUGATE_MULTIPLY_WGSL: &str = r"
struct Params { count: u32 }
@group(0) @binding(0) var<storage, read_write> a: array<f32>;
@group(0) @binding(1) var<storage, read_write> b: array<f32>;
@group(0) @binding(2) var<storage, read_write> output: array<f32>;
@group(0) @binding(3) var<uniform>             params: Params;
@compute @workgroup_size(256)
fn main(@builtin(global_invocation_id) gid: vec3<u32>) {
    if gid.x >= params.count { return; }
    let i = gid.x * 2u;
    let ar = a[i]; let ai = a[i + 1u];
    let br = b[i]; let bi = -b[i + 1u];
    output[i] = ar * br - ai * bi;
    output[i + 1u] = ar * bi + ai * br;
}
";

const DIVIDE_WGSL: &str = r"
struct Params { count: u32 }
@group(0) @binding(0) var<storage, read_write> a: array<f32>;
@group(0) @binding(1) var<storage, read_write> b: array<f32>;
@group(0) @binding(2) var<storage, read_write> output: array<f32>;
@group(0) @binding(3) var<uniform>             params: Params;
@compute @workgroup_size(256)
fn main(@builtin(global_invocation_id) gid: vec3<u32>) {
    if gid.x >= params.count { return; }
    output[gid.x] = a[gid.x] / b[gid.x];
}
";

/// Guarded division. `mode` 1 clamps the quotient to zero when
/// `|denominator| <= epsilon`; mode 2 floors the denominator at
/// `epsilon`. Every guarded lane bumps the counter.
const DIVIDE_GUARDED_WGSL: &str = r"
struct Params { count: u32, mode: u32, epsilon: f32 }
@group(0) @binding(0) var<storage, read_write> a: array<f32>;
@group(0) @binding(1) var<storage, read_write> b: array<f32>;
@group(0) @binding(2) var<storage, read_write> output: array<f32>;
@group(0) @binding(3) var<uniform>             params: Params;
@group(0) @binding(4) var<storage, read_write> guard_hits: atomic<u32>;
@compute @workgroup_size(256)
fn main(@builtin(global_invocation_id) gid: vec3<u32>) {
    if gid.x >= params.count { return; }
    let x = a[gid.x];
    let y = b[gid.x];
    var q: f32;
    if params.mode == 1u && abs(y) <= params.epsilon {
        q = 0.0;
        atomicAdd(&guard_hits, 1u);
    } else if params.mode == 2u && y < params.epsilon {
        q = x / params.epsilon;
        atomicAdd(&guard_hits, 1u);
    } else {
        q = x / y;
    }
    output[gid.x] = q;
}
";

const MULTIPLY_WGSL: &str = r"
struct Params { count: u32 }
@group(0) @binding(0) var<storage, read_write> a: array<f32>;
@group(0) @binding(1) var<storage, read_write> b: array<f32>;
@group(0) @binding(2) var<storage, read_write> output: array<f32>;
@group(0) @binding(3) var<uniform>             params: Params;
@compute @workgroup_size(256)
fn main(@builtin(global_invocation_id) gid: vec3<u32>) {
    if gid.x >= params.count { return; }
    output[gid.x] = a[gid.x] * b[gid.x];
}
";

// ---------------------------------------------------------------------------
// Uniform parameter blocks
// ---------------------------------------------------------------------------

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct FftParams {
    n: u32,
    stage: u32,
    lines: u32,
    stride: u32,
    inner: u32,
    outer: u32,
    direction: f32,
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct CountParams {
    count: u32,
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct PackParams {
    width: u32,
    packed_width: u32,
    count: u32,
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct GuardParams {
    count: u32,
    mode: u32,
    epsilon: f32,
}

const FORWARD: f32 = -1.0;
const INVERSE: f32 = 1.0;

fn wgpu_buf(buf: &DeviceBuffer) -> &wgpu::Buffer {
    match &buf.inner {
        BufferInner::Wgpu(buffer) => buffer,
        _ => panic!("expected GPU buffer, got CPU buffer"),
    }
}

const fn div_ceil(a: u32, b: u32) -> u32 {
    (a + b - 1) / b
}

// ---------------------------------------------------------------------------
// FFT plans
// ---------------------------------------------------------------------------

/// Scratch for one volume shape: three full-grid complex buffers that the
/// stage passes ping-pong through. Between passes exactly one of them (or
/// a caller buffer) holds live data, so any two others can serve as the
/// next ping-pong pair.
struct FftPlan {
    full: wgpu::Buffer,
    ping: wgpu::Buffer,
    pong: wgpu::Buffer,
}

impl FftPlan {
    /// Two plan buffers that are not `live`.
    fn scratch_pair(&self, live: &wgpu::Buffer) -> (&wgpu::Buffer, &wgpu::Buffer) {
        let mut free = [&self.full, &self.ping, &self.pong]
            .into_iter()
            .filter(|b| !std::ptr::eq(*b, live));
        let first = free.next().expect("plan holds three buffers");
        let second = free.next().expect("plan holds three buffers");
        (first, second)
    }

    /// One plan buffer that is not `live`.
    fn free_buffer(&self, live: &wgpu::Buffer) -> &wgpu::Buffer {
        self.scratch_pair(live).0
    }
}

// ---------------------------------------------------------------------------
// Backend
// ---------------------------------------------------------------------------

pub struct WgpuBackend {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    adapter_name: String,
    fft_stage_pipeline: wgpu::ComputePipeline,
    real_to_complex_pipeline: wgpu::ComputePipeline,
    pack_spectrum_pipeline: wgpu::ComputePipeline,
    unpack_spectrum_pipeline: wgpu::ComputePipeline,
    take_real_pipeline: wgpu::ComputePipeline,
    complex_multiply_pipeline: wgpu::ComputePipeline,
    conjugate_multiply_pipeline: wgpu::ComputePipeline,
    divide_pipeline: wgpu::ComputePipeline,
    divide_guarded_pipeline: wgpu::ComputePipeline,
    multiply_pipeline: wgpu::ComputePipeline,
    plans: Mutex<HashMap<VolumeDims, Arc<FftPlan>>>,
}

impl WgpuBackend {
    /// Acquire the highest-performance adapter and build all pipelines.
    pub fn new() -> Result<Self, LucidaError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor::default());

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: None,
            force_fallback_adapter: false,
        }))
        .map_err(|e| LucidaError::DeviceUnavailable(format!("no suitable GPU adapter: {e}")))?;

        let adapter_name = adapter.get_info().name;

        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("lucida-compute"),
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::default(),
            ..Default::default()
        }))
        .map_err(|e| LucidaError::DeviceUnavailable(format!("failed to create GPU device: {e}")))?;

        let mk = |label: &str, src: &str| {
            device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(label),
                source: wgpu::ShaderSource::Wgsl(src.into()),
            })
        };

        let fft_stage = mk("fft_stage", FFT_STAGE_WGSL);
        let real_to_complex = mk("real_to_complex", REAL_TO_COMPLEX_WGSL);
        let pack_spectrum = mk("pack_spectrum", PACK_SPECTRUM_WGSL);
        let unpack_spectrum = mk("unpack_spectrum", UNPACK_SPECTRUM_WGSL);
        let take_real = mk("take_real", TAKE_REAL_WGSL);
        let complex_multiply = mk("complex_multiply", COMPLEX_MULTIPLY_WGSL);
        let conjugate_multiply = mk("conjugate_multiply", CONJUGATE_MULTIPLY_WGSL);
        let divide = mk("divide", DIVIDE_WGSL);
        let divide_guarded = mk("divide_guarded", DIVIDE_GUARDED_WGSL);
        let multiply = mk("multiply", MULTIPLY_WGSL);

        let pipe = |module: &wgpu::ShaderModule| {
            device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: None,
                layout: None,
                module,
                entry_point: Some("main"),
                compilation_options: Default::default(),
                cache: None,
            })
        };

        Ok(Self {
            fft_stage_pipeline: pipe(&fft_stage),
            real_to_complex_pipeline: pipe(&real_to_complex),
            pack_spectrum_pipeline: pipe(&pack_spectrum),
            unpack_spectrum_pipeline: pipe(&unpack_spectrum),
            take_real_pipeline: pipe(&take_real),
            complex_multiply_pipeline: pipe(&complex_multiply),
            conjugate_multiply_pipeline: pipe(&conjugate_multiply),
            divide_pipeline: pipe(&divide),
            divide_guarded_pipeline: pipe(&divide_guarded),
            multiply_pipeline: pipe(&multiply),
            device: Arc::new(device),
            queue: Arc::new(queue),
            adapter_name,
            plans: Mutex::new(HashMap::new()),
        })
    }

    pub fn adapter_name(&self) -> &str {
        &self.adapter_name
    }

    // -- buffer helpers -----------------------------------------------------

    fn check_alloc(&self, bytes: u64) -> BackendResult<()> {
        let limits = self.device.limits();
        let max = limits
            .max_buffer_size
            .min(limits.max_storage_buffer_binding_size as u64);
        if bytes > max {
            return Err(BackendError::Allocation {
                bytes: bytes as usize,
                detail: format!("exceeds device limit of {max} bytes"),
            });
        }
        Ok(())
    }

    fn create_storage_uninit(&self, bytes: u64) -> wgpu::Buffer {
        self.device.create_buffer(&wgpu::BufferDescriptor {
            label: None,
            size: bytes,
            usage: wgpu::BufferUsages::STORAGE
                | wgpu::BufferUsages::COPY_SRC
                | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        })
    }

    fn create_uniform<T: Pod>(&self, value: &T) -> wgpu::Buffer {
        self.device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: None,
                contents: bytemuck::bytes_of(value),
                usage: wgpu::BufferUsages::UNIFORM,
            })
    }

    fn create_counter(&self) -> wgpu::Buffer {
        self.device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("guard_hits"),
                contents: bytemuck::bytes_of(&0u32),
                usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
            })
    }

    fn download_bytes(&self, buffer: &wgpu::Buffer, bytes: u64) -> BackendResult<Vec<u8>> {
        let staging = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: None,
            size: bytes,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let mut encoder = self.device.create_command_encoder(&Default::default());
        encoder.copy_buffer_to_buffer(buffer, 0, &staging, 0, bytes);
        self.queue.submit(std::iter::once(encoder.finish()));

        let slice = staging.slice(..);
        let (tx, rx) = std::sync::mpsc::sync_channel(1);
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        self.device
            .poll(wgpu::PollType::wait_indefinitely())
            .map_err(|e| BackendError::Sync(format!("device poll failed: {e}")))?;
        rx.recv()
            .map_err(|_| BackendError::Transfer("map callback dropped".into()))?
            .map_err(|e| BackendError::Transfer(format!("buffer mapping failed: {e}")))?;

        let data = slice.get_mapped_range().to_vec();
        staging.unmap();
        Ok(data)
    }

    fn download_u32(&self, buffer: &wgpu::Buffer) -> BackendResult<u32> {
        let data = self.download_bytes(buffer, 4)?;
        Ok(u32::from_le_bytes([data[0], data[1], data[2], data[3]]))
    }

    // -- dispatch helpers ---------------------------------------------------

    fn dispatch(
        &self,
        pipeline: &wgpu::ComputePipeline,
        entries: &[wgpu::BindGroupEntry],
        workgroups: (u32, u32, u32),
    ) {
        let layout = pipeline.get_bind_group_layout(0);
        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: None,
            layout: &layout,
            entries,
        });
        let mut encoder = self.device.create_command_encoder(&Default::default());
        {
            let mut pass = encoder.begin_compute_pass(&Default::default());
            pass.set_pipeline(pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            pass.dispatch_workgroups(workgroups.0, workgroups.1, workgroups.2);
        }
        self.queue.submit(std::iter::once(encoder.finish()));
    }

    /// Map one line geometry over a three-buffer scratch set. Requires
    /// `n >= 2` and `src` distinct from both scratch buffers; returns the
    /// buffer holding the transformed grid.
    #[allow(clippy::too_many_arguments)]
    fn fft_axis<'a>(
        &self,
        src: &wgpu::Buffer,
        scratch: (&'a wgpu::Buffer, &'a wgpu::Buffer),
        n: u32,
        lines: u32,
        stride: u32,
        inner: u32,
        outer: u32,
        direction: f32,
    ) -> &'a wgpu::Buffer {
        let stages = n.trailing_zeros();
        debug_assert!(stages > 0, "length-1 axes are identity, skip them");

        let uniforms: Vec<wgpu::Buffer> = (0..stages)
            .map(|stage| {
                self.create_uniform(&FftParams {
                    n,
                    stage,
                    lines,
                    stride,
                    inner,
                    outer,
                    direction,
                })
            })
            .collect();

        let layout = self.fft_stage_pipeline.get_bind_group_layout(0);
        let wg_x = div_ceil((n / 2) * lines, 256);

        let mut encoder = self.device.create_command_encoder(&Default::default());
        for stage in 0..stages as usize {
            let stage_src = if stage == 0 {
                src
            } else if stage % 2 == 1 {
                scratch.0
            } else {
                scratch.1
            };
            let stage_dst = if stage % 2 == 0 { scratch.0 } else { scratch.1 };
            let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: None,
                layout: &layout,
                entries: &[
                    bge(0, stage_src),
                    bge(1, stage_dst),
                    bge(2, &uniforms[stage]),
                ],
            });
            let mut pass = encoder.begin_compute_pass(&Default::default());
            pass.set_pipeline(&self.fft_stage_pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            pass.dispatch_workgroups(wg_x, 1, 1);
        }
        self.queue.submit(std::iter::once(encoder.finish()));

        if stages % 2 == 1 {
            scratch.0
        } else {
            scratch.1
        }
    }

    fn copy_buffer(&self, src: &wgpu::Buffer, dst: &wgpu::Buffer, bytes: u64) {
        let mut encoder = self.device.create_command_encoder(&Default::default());
        encoder.copy_buffer_to_buffer(src, 0, dst, 0, bytes);
        self.queue.submit(std::iter::once(encoder.finish()));
    }

    fn elementwise(
        &self,
        pipeline: &wgpu::ComputePipeline,
        a: &DeviceBuffer,
        b: &DeviceBuffer,
        out: &DeviceBuffer,
        count: u32,
    ) {
        let uniform = self.create_uniform(&CountParams { count });
        self.dispatch(
            pipeline,
            &[
                bge(0, wgpu_buf(a)),
                bge(1, wgpu_buf(b)),
                bge(2, wgpu_buf(out)),
                bge(3, &uniform),
            ],
            (div_ceil(count, 256), 1, 1),
        );
    }

    fn plan_for(&self, dims: VolumeDims) -> BackendResult<Arc<FftPlan>> {
        let bytes = dims.len() as u64 * 8;
        self.check_alloc(bytes)?;
        let mut plans = self.plans.lock().expect("plan cache lock poisoned");
        if let Some(plan) = plans.get(&dims) {
            return Ok(plan.clone());
        }
        let plan = Arc::new(FftPlan {
            full: self.create_storage_uninit(bytes),
            ping: self.create_storage_uninit(bytes),
            pong: self.create_storage_uninit(bytes),
        });
        plans.insert(dims, plan.clone());
        Ok(plan)
    }

    fn check_transform_dims(&self, dims: VolumeDims) -> BackendResult<()> {
        if dims.is_empty() || !dims.is_power_of_two() {
            return Err(BackendError::Transform(format!(
                "GPU transforms require non-empty power-of-two dimensions, got {dims}"
            )));
        }
        Ok(())
    }
}

fn bge<'a>(binding: u32, buffer: &'a wgpu::Buffer) -> wgpu::BindGroupEntry<'a> {
    wgpu::BindGroupEntry {
        binding,
        resource: buffer.as_entire_binding(),
    }
}

impl ComputeBackend for WgpuBackend {
    fn name(&self) -> &str {
        &self.adapter_name
    }

    fn is_gpu(&self) -> bool {
        true
    }

    fn supports_dims(&self, dims: VolumeDims) -> bool {
        !dims.is_empty() && dims.is_power_of_two()
    }

    fn alloc(&self, kind: ElementKind, len: usize) -> BackendResult<DeviceBuffer> {
        let f32_len = match kind {
            ElementKind::Real => len,
            ElementKind::Complex => len * 2,
        };
        let bytes = f32_len as u64 * 4;
        self.check_alloc(bytes)?;
        // wgpu zero-initializes buffers on first use.
        let buffer = self.create_storage_uninit(bytes);
        Ok(DeviceBuffer::new_wgpu(buffer, f32_len, kind))
    }

    fn upload(&self, host: &[f32], dst: &DeviceBuffer) -> BackendResult<()> {
        assert_eq!(host.len(), dst.len(), "upload length mismatch");
        self.queue
            .write_buffer(wgpu_buf(dst), 0, bytemuck::cast_slice(host));
        Ok(())
    }

    fn download(&self, src: &DeviceBuffer, host: &mut [f32]) -> BackendResult<()> {
        assert_eq!(src.len(), host.len(), "download length mismatch");
        let bytes = self.download_bytes(wgpu_buf(src), src.len() as u64 * 4)?;
        host.copy_from_slice(bytemuck::cast_slice(&bytes));
        Ok(())
    }

    fn forward_transform(
        &self,
        dims: VolumeDims,
        src: &DeviceBuffer,
        dst: &DeviceBuffer,
    ) -> BackendResult<()> {
        self.check_transform_dims(dims)?;
        let plan = self.plan_for(dims)?;

        let (n0, n1, n2) = (
            dims.width as u32,
            dims.height as u32,
            dims.depth as u32,
        );
        let n0h = dims.spectrum_width() as u32;
        let full = dims.len() as u32;
        let packed = dims.spectrum_len() as u32;

        let r2c_uniform = self.create_uniform(&CountParams { count: full });
        self.dispatch(
            &self.real_to_complex_pipeline,
            &[bge(0, wgpu_buf(src)), bge(1, &plan.full), bge(2, &r2c_uniform)],
            (div_ceil(full, 256), 1, 1),
        );

        let mut cur: &wgpu::Buffer = &plan.full;
        if n0 > 1 {
            cur = self.fft_axis(cur, plan.scratch_pair(cur), n0, n1 * n2, 1, 1, n0, FORWARD);
        }

        let pack_dst = plan.free_buffer(cur);
        let pack_uniform = self.create_uniform(&PackParams {
            width: n0,
            packed_width: n0h,
            count: packed,
        });
        self.dispatch(
            &self.pack_spectrum_pipeline,
            &[bge(0, cur), bge(1, pack_dst), bge(2, &pack_uniform)],
            (div_ceil(packed, 256), 1, 1),
        );
        cur = pack_dst;

        if n1 > 1 {
            cur = self.fft_axis(
                cur,
                plan.scratch_pair(cur),
                n1,
                n0h * n2,
                n0h,
                n0h,
                n0h * n1,
                FORWARD,
            );
        }
        if n2 > 1 {
            cur = self.fft_axis(
                cur,
                plan.scratch_pair(cur),
                n2,
                n0h * n1,
                n0h * n1,
                n0h * n1,
                packed,
                FORWARD,
            );
        }

        self.copy_buffer(cur, wgpu_buf(dst), packed as u64 * 8);
        Ok(())
    }

    fn inverse_transform(
        &self,
        dims: VolumeDims,
        src: &DeviceBuffer,
        dst: &DeviceBuffer,
    ) -> BackendResult<()> {
        self.check_transform_dims(dims)?;
        let plan = self.plan_for(dims)?;

        let (n0, n1, n2) = (
            dims.width as u32,
            dims.height as u32,
            dims.depth as u32,
        );
        let n0h = dims.spectrum_width() as u32;
        let full = dims.len() as u32;
        let packed = dims.spectrum_len() as u32;

        let mut cur: &wgpu::Buffer = wgpu_buf(src);
        if n2 > 1 {
            cur = self.fft_axis(
                cur,
                plan.scratch_pair(cur),
                n2,
                n0h * n1,
                n0h * n1,
                n0h * n1,
                packed,
                INVERSE,
            );
        }
        if n1 > 1 {
            cur = self.fft_axis(
                cur,
                plan.scratch_pair(cur),
                n1,
                n0h * n2,
                n0h,
                n0h,
                n0h * n1,
                INVERSE,
            );
        }

        let unpack_dst = plan.free_buffer(cur);
        let unpack_uniform = self.create_uniform(&PackParams {
            width: n0,
            packed_width: n0h,
            count: full,
        });
        self.dispatch(
            &self.unpack_spectrum_pipeline,
            &[bge(0, cur), bge(1, unpack_dst), bge(2, &unpack_uniform)],
            (div_ceil(full, 256), 1, 1),
        );
        cur = unpack_dst;

        if n0 > 1 {
            cur = self.fft_axis(cur, plan.scratch_pair(cur), n0, n1 * n2, 1, 1, n0, INVERSE);
        }

        let real_uniform = self.create_uniform(&CountParams { count: full });
        self.dispatch(
            &self.take_real_pipeline,
            &[bge(0, cur), bge(1, wgpu_buf(dst)), bge(2, &real_uniform)],
            (div_ceil(full, 256), 1, 1),
        );
        Ok(())
    }

    fn complex_multiply(
        &self,
        a: &DeviceBuffer,
        b: &DeviceBuffer,
        out: &DeviceBuffer,
    ) -> BackendResult<()> {
        self.elementwise(&self.complex_multiply_pipeline, a, b, out, (a.len() / 2) as u32);
        Ok(())
    }

    fn complex_conjugate_multiply(
        &self,
        a: &DeviceBuffer,
        b: &DeviceBuffer,
        out: &DeviceBuffer,
    ) -> BackendResult<()> {
        self.elementwise(
            &self.conjugate_multiply_pipeline,
            a,
            b,
            out,
            (a.len() / 2) as u32,
        );
        Ok(())
    }

    fn divide(
        &self,
        a: &DeviceBuffer,
        b: &DeviceBuffer,
        out: &DeviceBuffer,
        guard: ZeroGuard,
    ) -> BackendResult<u64> {
        let count = a.len() as u32;
        let (mode, epsilon) = match guard {
            ZeroGuard::Disabled => {
                self.elementwise(&self.divide_pipeline, a, b, out, count);
                return Ok(0);
            }
            ZeroGuard::ClampToZero { epsilon } => (1u32, epsilon),
            ZeroGuard::Floor { epsilon } => (2u32, epsilon),
        };

        let uniform = self.create_uniform(&GuardParams { count, mode, epsilon });
        let counter = self.create_counter();
        self.dispatch(
            &self.divide_guarded_pipeline,
            &[
                bge(0, wgpu_buf(a)),
                bge(1, wgpu_buf(b)),
                bge(2, wgpu_buf(out)),
                bge(3, &uniform),
                bge(4, &counter),
            ],
            (div_ceil(count, 256), 1, 1),
        );
        Ok(self.download_u32(&counter)? as u64)
    }

    fn multiply(
        &self,
        a: &DeviceBuffer,
        b: &DeviceBuffer,
        out: &DeviceBuffer,
    ) -> BackendResult<()> {
        self.elementwise(&self.multiply_pipeline, a, b, out, a.len() as u32);
        Ok(())
    }

    fn synchronize(&self) -> BackendResult<()> {
        self.device
            .poll(wgpu::PollType::wait_indefinitely())
            .map_err(|e| BackendError::Sync(format!("device poll failed: {e}")))?;
        Ok(())
    }
}
