use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use marten_core::{
    bail, with_native_dtype, Allocator, Array, DType, Error, HostAllocator, Result, WithDType,
};

use crate::copy::{
    CopyType, COPY_SLOT_DST, COPY_SLOT_DST_OFFSET, COPY_SLOT_DST_STRIDES, COPY_SLOT_NDIM,
    COPY_SLOT_SHAPE, COPY_SLOT_SRC, COPY_SLOT_SRC_OFFSET, COPY_SLOT_SRC_STRIDES,
};
use crate::device::{CommandEncoder, Device, GridDims, Kernel, Stream};
use crate::primitives::{
    ARANGE_SLOT_OUT, ARANGE_SLOT_START, ARANGE_SLOT_STEP, ARG_REDUCE_SLOT_AXIS_SIZE,
    ARG_REDUCE_SLOT_AXIS_STRIDE, ARG_REDUCE_SLOT_IN, ARG_REDUCE_SLOT_IN_STRIDES,
    ARG_REDUCE_SLOT_NDIM, ARG_REDUCE_SLOT_OUT, ARG_REDUCE_SLOT_OUT_STRIDES,
    ARG_REDUCE_SLOT_SHAPE, CONJ_SLOT_IN, CONJ_SLOT_OUT, RBITS_SLOT_BYTES_PER_KEY, RBITS_SLOT_KEYS,
    RBITS_SLOT_OUT,
};

// Sim — A software device executing the kernel ABI on host memory
//
// SimDevice implements the Device/CommandEncoder traits by actually running
// each kernel on the host at dispatch time. It decodes kernel arguments from
// the same positional slots and byte encodings the dispatchers bind, so a
// packing/unpacking mismatch shows up as wrong results or a decode failure
// in tests rather than slipping through.
//
// Every dispatch is also recorded (kernel name, geometry, raw byte
// arguments, concurrent-region flag) for tests that assert on the dispatch
// itself rather than on the computed values.

/// One recorded kernel dispatch.
#[derive(Debug, Clone)]
pub struct LaunchRecord {
    pub kernel: String,
    pub grid: GridDims,
    pub group: GridDims,
    /// Whether the dispatch was submitted inside a concurrent region.
    pub concurrent: bool,
    /// Raw byte arguments by slot (buffers excluded).
    pub bytes: BTreeMap<usize, Vec<u8>>,
}

struct SimState {
    launches: Mutex<Vec<LaunchRecord>>,
    concurrent_depth: AtomicUsize,
}

/// A resolved kernel on the software device.
#[derive(Debug, Clone)]
pub struct SimKernel {
    name: String,
    max_threads: usize,
}

impl Kernel for SimKernel {
    fn name(&self) -> &str {
        &self.name
    }

    fn max_total_threads_per_threadgroup(&self) -> usize {
        self.max_threads
    }
}

/// The software device.
pub struct SimDevice {
    state: Arc<SimState>,
    allocator: HostAllocator,
    max_threads: usize,
}

impl SimDevice {
    pub fn new() -> SimDevice {
        SimDevice::with_allocator(HostAllocator::unbounded())
    }

    pub fn with_allocator(allocator: HostAllocator) -> SimDevice {
        SimDevice {
            state: Arc::new(SimState {
                launches: Mutex::new(Vec::new()),
                concurrent_depth: AtomicUsize::new(0),
            }),
            allocator,
            max_threads: 1024,
        }
    }

    /// Override the per-kernel thread-group limit reported to dispatchers.
    pub fn with_max_threads(mut self, max_threads: usize) -> SimDevice {
        self.max_threads = max_threads;
        self
    }

    /// All dispatches recorded so far, in submission order.
    pub fn launches(&self) -> Vec<LaunchRecord> {
        self.state.launches.lock().unwrap().clone()
    }

    pub fn clear_launches(&self) {
        self.state.launches.lock().unwrap().clear();
    }
}

impl Default for SimDevice {
    fn default() -> Self {
        SimDevice::new()
    }
}

impl Device for SimDevice {
    type Kernel = SimKernel;
    type Encoder = SimEncoder;

    fn name(&self) -> &'static str {
        "sim"
    }

    fn get_kernel(&self, name: &str) -> Result<SimKernel> {
        if !kernel_registered(name) {
            return Err(Error::KernelNotFound {
                name: name.to_string(),
            });
        }
        Ok(SimKernel {
            name: name.to_string(),
            max_threads: self.max_threads,
        })
    }

    fn command_encoder(&self, _stream: Stream) -> Result<SimEncoder> {
        Ok(SimEncoder {
            state: Arc::clone(&self.state),
            kernel: None,
            arrays: HashMap::new(),
            bytes: HashMap::new(),
        })
    }

    fn allocator(&self) -> &dyn Allocator {
        &self.allocator
    }
}

/// Whether the software device has an implementation for a kernel name.
fn kernel_registered(name: &str) -> bool {
    if name == "rbits" || name == "rbitsc" || name == "conj_complex64" {
        return true;
    }
    if let Some(suffix) = name.strip_prefix("arange_") {
        return matches!(
            DType::from_kernel_name(suffix),
            Some(d) if !matches!(d, DType::Bool | DType::C64)
        );
    }
    if let Some(suffix) = name
        .strip_prefix("argmin_")
        .or_else(|| name.strip_prefix("argmax_"))
    {
        return matches!(
            DType::from_kernel_name(suffix),
            Some(d) if !matches!(d, DType::Bool | DType::C64)
        );
    }
    if let Some(rest) = name.strip_prefix("copy_") {
        return parse_copy_kernel(rest).is_some();
    }
    false
}

/// Parse the `{tag}_{src}_{dst}` remainder of a copy kernel name.
///
/// Dtype-converting copies are only registered between natively
/// representable dtypes; same-dtype copies exist for every dtype.
fn parse_copy_kernel(rest: &str) -> Option<(CopyType, DType, DType)> {
    let (ctype, rest) = if let Some(r) = rest.strip_prefix("gg_") {
        (CopyType::GeneralGeneral, r)
    } else if let Some(r) = rest.strip_prefix("g_") {
        (CopyType::General, r)
    } else if let Some(r) = rest.strip_prefix("s_") {
        (CopyType::Scalar, r)
    } else if let Some(r) = rest.strip_prefix("v_") {
        (CopyType::Vector, r)
    } else {
        return None;
    };
    for src in DType::ALL {
        if let Some(after) = rest.strip_prefix(src.kernel_name()) {
            if let Some(dst_name) = after.strip_prefix('_') {
                if let Some(dst) = DType::from_kernel_name(dst_name) {
                    let convertible = src == dst
                        || (!matches!(src, DType::Bool | DType::C64)
                            && !matches!(dst, DType::Bool | DType::C64));
                    if convertible {
                        return Some((ctype, src, dst));
                    }
                }
            }
        }
    }
    None
}

/// Encoder that executes kernels eagerly at dispatch time.
pub struct SimEncoder {
    state: Arc<SimState>,
    kernel: Option<SimKernel>,
    arrays: HashMap<usize, Array>,
    bytes: HashMap<usize, Vec<u8>>,
}

impl SimEncoder {
    fn array(&self, slot: usize) -> Result<&Array> {
        self.arrays
            .get(&slot)
            .ok_or_else(|| Error::msg(format!("no array bound at slot {}", slot)))
    }

    fn raw(&self, slot: usize) -> Result<&[u8]> {
        self.bytes
            .get(&slot)
            .map(|b| b.as_slice())
            .ok_or_else(|| Error::msg(format!("no bytes bound at slot {}", slot)))
    }

    fn raw_u64(&self, slot: usize) -> Result<u64> {
        let b = self.raw(slot)?;
        if b.len() != 8 {
            bail!("slot {}: expected 8 bytes for a u64 argument, got {}", slot, b.len());
        }
        Ok(u64::from_le_bytes([
            b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
        ]))
    }

    /// First `n` i32 words of a packed shape argument.
    fn raw_i32s(&self, slot: usize, n: usize) -> Result<Vec<usize>> {
        let b = self.raw(slot)?;
        if b.len() < n * 4 {
            bail!("slot {}: expected at least {} shape words, got {} bytes", slot, n, b.len());
        }
        Ok((0..n)
            .map(|i| i32::from_le_bytes([b[i * 4], b[i * 4 + 1], b[i * 4 + 2], b[i * 4 + 3]]) as usize)
            .collect())
    }

    /// First `n` u64 words of a packed strides argument.
    fn raw_u64s(&self, slot: usize, n: usize) -> Result<Vec<usize>> {
        let b = self.raw(slot)?;
        if b.len() < n * 8 {
            bail!("slot {}: expected at least {} stride words, got {} bytes", slot, n, b.len());
        }
        Ok((0..n)
            .map(|i| {
                let mut w = [0u8; 8];
                w.copy_from_slice(&b[i * 8..i * 8 + 8]);
                u64::from_le_bytes(w) as usize
            })
            .collect())
    }

    fn execute(&self, name: &str, grid: GridDims) -> Result<()> {
        if name == "rbits" || name == "rbitsc" {
            return self.exec_random_bits();
        }
        if name == "conj_complex64" {
            return self.exec_conjugate();
        }
        if let Some(suffix) = name.strip_prefix("arange_") {
            let dtype = DType::from_kernel_name(suffix)
                .ok_or_else(|| Error::msg(format!("bad arange kernel name '{}'", name)))?;
            return self.exec_arange(dtype);
        }
        if let Some(suffix) = name.strip_prefix("argmin_") {
            let dtype = DType::from_kernel_name(suffix)
                .ok_or_else(|| Error::msg(format!("bad argmin kernel name '{}'", name)))?;
            return self.exec_arg_reduce(dtype, false);
        }
        if let Some(suffix) = name.strip_prefix("argmax_") {
            let dtype = DType::from_kernel_name(suffix)
                .ok_or_else(|| Error::msg(format!("bad argmax kernel name '{}'", name)))?;
            return self.exec_arg_reduce(dtype, true);
        }
        if let Some(rest) = name.strip_prefix("copy_") {
            let (ctype, src_dt, dst_dt) = parse_copy_kernel(rest)
                .ok_or_else(|| Error::msg(format!("bad copy kernel name '{}'", name)))?;
            return self.exec_copy(ctype, src_dt, dst_dt, grid);
        }
        bail!("no software implementation for kernel '{}'", name)
    }

    fn exec_arange(&self, dtype: DType) -> Result<()> {
        let out = self.array(ARANGE_SLOT_OUT)?;
        let start = self.raw(ARANGE_SLOT_START)?;
        let step = self.raw(ARANGE_SLOT_STEP)?;
        let buf = out.buffer()?;
        let isz = out.itemsize();
        with_native_dtype!(dtype, T => {
            let s = <T as WithDType>::from_le_bytes(start);
            let st = <T as WithDType>::from_le_bytes(step);
            for i in 0..out.size() {
                let v = T::from_f64(s.to_f64() + i as f64 * st.to_f64());
                buf.write((out.offset() + i) * isz, &WithDType::to_le_bytes(v));
            }
            Ok(())
        }, Err(Error::UnsupportedDType { op: "arange", dtype }))
    }

    fn exec_arg_reduce(&self, dtype: DType, find_max: bool) -> Result<()> {
        let input = self.array(ARG_REDUCE_SLOT_IN)?;
        let out = self.array(ARG_REDUCE_SLOT_OUT)?;
        let ndim = self.raw_u64(ARG_REDUCE_SLOT_NDIM)? as usize;
        let shape = self.raw_i32s(ARG_REDUCE_SLOT_SHAPE, ndim)?;
        let in_strides = self.raw_u64s(ARG_REDUCE_SLOT_IN_STRIDES, ndim)?;
        let out_strides = self.raw_u64s(ARG_REDUCE_SLOT_OUT_STRIDES, ndim)?;
        let axis_stride = self.raw_u64(ARG_REDUCE_SLOT_AXIS_STRIDE)? as usize;
        let axis_size = self.raw_u64(ARG_REDUCE_SLOT_AXIS_SIZE)? as usize;

        let src = input.buffer()?.read_all();
        let out_buf = out.buffer()?;
        let isz = input.itemsize();

        for j in 0..out.size() {
            let idx = unravel(j, &shape);
            let in_base = input.offset() + dot(&idx, &in_strides);
            let out_loc = out.offset() + dot(&idx, &out_strides);
            let winner = with_native_dtype!(dtype, T => {
                let read = |k: usize| -> f64 {
                    let at = (in_base + k * axis_stride) * isz;
                    <T as WithDType>::from_le_bytes(&src[at..at + isz]).to_f64()
                };
                let mut best = read(0);
                let mut best_idx = 0u32;
                // Ties keep the earliest index.
                for k in 1..axis_size {
                    let v = read(k);
                    if (find_max && v > best) || (!find_max && v < best) {
                        best = v;
                        best_idx = k as u32;
                    }
                }
                best_idx
            }, return Err(Error::UnsupportedDType { op: "arg_reduce", dtype }));
            out_buf.write(out_loc * 4, &winner.to_le_bytes());
        }
        Ok(())
    }

    fn exec_copy(&self, ctype: CopyType, src_dt: DType, dst_dt: DType, grid: GridDims) -> Result<()> {
        let src_arr = self.array(COPY_SLOT_SRC)?;
        let dst_arr = self.array(COPY_SLOT_DST)?;
        let src = src_arr.buffer()?.read_all();
        let dst_buf = dst_arr.buffer()?;
        let s_isz = src_dt.size_in_bytes();
        let d_isz = dst_dt.size_in_bytes();

        match ctype {
            CopyType::Scalar => {
                let at = src_arr.offset() * s_isz;
                let v = convert_elem(&src[at..at + s_isz], src_dt, dst_dt)?;
                for i in 0..grid.total() {
                    dst_buf.write((dst_arr.offset() + i) * d_isz, &v);
                }
            }
            CopyType::Vector => {
                for i in 0..grid.total() {
                    let at = (src_arr.offset() + i) * s_isz;
                    let v = convert_elem(&src[at..at + s_isz], src_dt, dst_dt)?;
                    dst_buf.write((dst_arr.offset() + i) * d_isz, &v);
                }
            }
            CopyType::General | CopyType::GeneralGeneral => {
                let ndim = self.raw_u64(COPY_SLOT_NDIM)? as usize;
                let shape = self.raw_i32s(COPY_SLOT_SHAPE, ndim)?;
                let src_strides = self.raw_u64s(COPY_SLOT_SRC_STRIDES, ndim)?;
                let dst_strides = self.raw_u64s(COPY_SLOT_DST_STRIDES, ndim)?;
                let src_off = self.raw_u64(COPY_SLOT_SRC_OFFSET)? as usize;
                let dst_off = self.raw_u64(COPY_SLOT_DST_OFFSET)? as usize;
                let total: usize = shape.iter().product();
                for j in 0..total {
                    let idx = unravel(j, &shape);
                    let s_loc = src_arr.offset() + src_off + dot(&idx, &src_strides);
                    let d_loc = dst_arr.offset() + dst_off + dot(&idx, &dst_strides);
                    let at = s_loc * s_isz;
                    let v = convert_elem(&src[at..at + s_isz], src_dt, dst_dt)?;
                    dst_buf.write(d_loc * d_isz, &v);
                }
            }
        }
        Ok(())
    }

    fn exec_random_bits(&self) -> Result<()> {
        let keys = self.array(RBITS_SLOT_KEYS)?;
        let out = self.array(RBITS_SLOT_OUT)?;
        let bytes_per_key = self.raw_u64(RBITS_SLOT_BYTES_PER_KEY)? as usize;

        // Key words in logical order, whatever the key array's layout; this
        // is why contiguous and strided key arrays yield identical bits.
        let key_src = keys.buffer()?.read_all();
        let word_locs: Vec<usize> = keys.layout().strided_indices().collect();
        let read_word = |loc: usize| -> u64 {
            let mut w = [0u8; 8];
            w.copy_from_slice(&key_src[loc * 8..loc * 8 + 8]);
            u64::from_le_bytes(w)
        };

        let out_buf = out.buffer()?;
        let base_byte = out.offset() * out.itemsize();
        let num_keys = keys.size() / 2;
        for k in 0..num_keys {
            let key = (read_word(word_locs[2 * k]), read_word(word_locs[2 * k + 1]));
            let mut bits = Vec::with_capacity(bytes_per_key + 16);
            let mut counter = 0u64;
            while bits.len() < bytes_per_key {
                let (x0, x1) = threefry2x64(key, (counter, 0));
                bits.extend_from_slice(&x0.to_le_bytes());
                bits.extend_from_slice(&x1.to_le_bytes());
                counter += 1;
            }
            bits.truncate(bytes_per_key);
            out_buf.write(base_byte + k * bytes_per_key, &bits);
        }
        Ok(())
    }

    fn exec_conjugate(&self) -> Result<()> {
        let input = self.array(CONJ_SLOT_IN)?;
        let out = self.array(CONJ_SLOT_OUT)?;
        let src = input.buffer()?.read_all();
        let out_buf = out.buffer()?;
        for (i, loc) in input.layout().strided_indices().enumerate() {
            let at = loc * 8;
            let re = f32::from_le_bytes([src[at], src[at + 1], src[at + 2], src[at + 3]]);
            let im = f32::from_le_bytes([src[at + 4], src[at + 5], src[at + 6], src[at + 7]]);
            let to = (out.offset() + i) * 8;
            out_buf.write(to, &re.to_le_bytes());
            out_buf.write(to + 4, &(-im).to_le_bytes());
        }
        Ok(())
    }
}

impl CommandEncoder for SimEncoder {
    type Kernel = SimKernel;

    fn set_pipeline(&mut self, kernel: &SimKernel) {
        self.kernel = Some(kernel.clone());
        self.arrays.clear();
        self.bytes.clear();
    }

    fn set_input_array(&mut self, array: &Array, slot: usize) {
        self.arrays.insert(slot, array.clone());
    }

    fn set_output_array(&mut self, array: &Array, slot: usize) {
        self.arrays.insert(slot, array.clone());
    }

    fn set_bytes(&mut self, bytes: &[u8], slot: usize) {
        self.bytes.insert(slot, bytes.to_vec());
    }

    fn dispatch_threads(&mut self, grid: GridDims, group: GridDims) -> Result<()> {
        let kernel = self
            .kernel
            .as_ref()
            .ok_or_else(|| Error::msg("dispatch without a pipeline set"))?
            .clone();
        if grid.total() == 0 {
            bail!("dispatch of kernel '{}' with an empty grid", kernel.name);
        }
        if group.total() > kernel.max_threads {
            bail!(
                "thread-group of {} threads exceeds kernel '{}' limit of {}",
                group.total(),
                kernel.name,
                kernel.max_threads
            );
        }

        self.execute(&kernel.name, grid)?;

        self.state.launches.lock().unwrap().push(LaunchRecord {
            kernel: kernel.name.clone(),
            grid,
            group,
            concurrent: self.state.concurrent_depth.load(Ordering::SeqCst) > 0,
            bytes: self.bytes.iter().map(|(&k, v)| (k, v.clone())).collect(),
        });
        Ok(())
    }

    fn begin_concurrent(&mut self) {
        self.state.concurrent_depth.fetch_add(1, Ordering::SeqCst);
    }

    fn end_concurrent(&mut self) {
        self.state.concurrent_depth.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Multi-index of flat position `j` in a row-major traversal of `shape`.
fn unravel(mut j: usize, shape: &[usize]) -> Vec<usize> {
    let mut idx = vec![0usize; shape.len()];
    for d in (0..shape.len()).rev() {
        idx[d] = j % shape[d];
        j /= shape[d];
    }
    idx
}

fn dot(idx: &[usize], strides: &[usize]) -> usize {
    idx.iter().zip(strides).map(|(&i, &s)| i * s).sum()
}

/// Convert one element's bytes from `src_dt` to `dst_dt` (little-endian,
/// via f64 for cross-dtype conversion; byte-identical when dtypes match).
fn convert_elem(bytes: &[u8], src_dt: DType, dst_dt: DType) -> Result<Vec<u8>> {
    if src_dt == dst_dt {
        return Ok(bytes.to_vec());
    }
    with_native_dtype!(src_dt, S => {
        let v = <S as WithDType>::from_le_bytes(bytes).to_f64();
        with_native_dtype!(dst_dt, D => Ok(WithDType::to_le_bytes(D::from_f64(v))),
            Err(Error::UnsupportedDType { op: "copy", dtype: dst_dt }))
    }, Err(Error::UnsupportedDType { op: "copy", dtype: src_dt }))
}

/// Threefry 2x64 counter-based pseudorandom permutation (20 rounds).
fn threefry2x64(key: (u64, u64), ctr: (u64, u64)) -> (u64, u64) {
    const C240: u64 = 0x1BD1_1BDA_A9FC_1A22;
    const ROT: [u32; 8] = [16, 42, 12, 31, 16, 32, 24, 21];
    let ks = [key.0, key.1, key.0 ^ key.1 ^ C240];
    let mut x0 = ctr.0.wrapping_add(ks[0]);
    let mut x1 = ctr.1.wrapping_add(ks[1]);
    for round in 0..20 {
        x0 = x0.wrapping_add(x1);
        x1 = x1.rotate_left(ROT[round % 8]);
        x1 ^= x0;
        if (round + 1) % 4 == 0 {
            let s = (round + 1) / 4;
            x0 = x0.wrapping_add(ks[s % 3]);
            x1 = x1.wrapping_add(ks[(s + 1) % 3]).wrapping_add(s as u64);
        }
    }
    (x0, x1)
}
