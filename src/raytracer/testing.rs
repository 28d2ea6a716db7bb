//! In-memory backend with a simulated frame clock.
//!
//! Dispatches take effect when the frame they were recorded in has retired, the moment a real backend's
//! `begin_frame` returns from the fence wait. Reading or overwriting a buffer before that is recorded as a hazard.

use crate::raytracer::backend::{Binding, BufferDesc, ComputeBackend, Dispatch, GpuBuffer, Kernel, binding};
use crate::raytracer::types::{LightBakeVertex, RayTraceUniforms, VertexLightData};
use crate::raytracer::{MAX_FRAMES_IN_FLIGHT, RayTraceError};
use bytemuck::Pod;
use std::cell::{Ref, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    Dispatch { kernel: Kernel, frame: u64, groups: [u32; 3] },
    Barrier { buffer: u64 },
}

#[derive(Default)]
pub struct MockState {
    next_id: u64,
    pub frame: u64,
    pub created: Vec<(u64, &'static str, u64)>,
    pub destroyed: Vec<u64>,
    pub commands: Vec<Command>,
    pub reads: usize,
    pub stale_reads: usize,
    pub host_write_hazards: usize,
    pub freed_in_use: usize,
    pub uniforms: Vec<(Kernel, RayTraceUniforms)>,
    pending: Vec<PendingDispatch>,
}

impl MockState {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn is_pending(&self, id: u64) -> bool {
        self.pending.iter().any(|p| p.buffers.values().any(|(b, _)| *b == id))
    }

    pub fn dispatches(&self) -> Vec<Kernel> {
        self.commands
            .iter()
            .filter_map(|c| match c {
                Command::Dispatch { kernel, .. } => Some(*kernel),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, kernel: Kernel) -> usize {
        self.dispatches().iter().filter(|k| **k == kernel).count()
    }
}

struct PendingDispatch {
    frame: u64,
    kernel: Kernel,
    uniforms: RayTraceUniforms,
    buffers: HashMap<u32, (u64, Rc<RefCell<Vec<u8>>>)>,
}

pub struct MockBuffer {
    pub id: u64,
    pub name: &'static str,
    pub host_visible: bool,
    size: u64,
    data: Rc<RefCell<Vec<u8>>>,
    state: Rc<RefCell<MockState>>,
}

impl GpuBuffer for MockBuffer {
    fn size(&self) -> u64 {
        self.size
    }
}

impl Drop for MockBuffer {
    fn drop(&mut self) {
        if let Ok(mut state) = self.state.try_borrow_mut() {
            if state.is_pending(self.id) {
                state.freed_in_use += 1;
            }
            state.destroyed.push(self.id);
        }
    }
}

pub struct MockImage {
    pub id: u64,
    pub width: u32,
    pub height: u32,
}

pub struct MockGpu {
    state: Rc<RefCell<MockState>>,
}

impl MockGpu {
    pub fn new() -> Self {
        Self {
            state: Rc::new(RefCell::new(MockState::default())),
        }
    }

    pub fn state(&self) -> Ref<'_, MockState> {
        self.state.borrow()
    }

    /// Runs one whole frame without recording anything.
    pub fn idle_frame(&mut self) {
        let _ = self.begin_frame();
        let _ = self.end_frame();
    }

    fn apply(dispatch: PendingDispatch) {
        let n = dispatch.uniforms.num_bake_vertices as usize;
        let buffer = |slot: u32| dispatch.buffers.get(&slot).map(|(_, data)| data.clone());

        match dispatch.kernel {
            Kernel::LightBakeDirect => {
                let Some(vertices) = buffer(binding::BAKE_VERTICES) else {
                    return;
                };
                let light = dispatch.uniforms.num_lights as f32;

                update::<LightBakeVertex>(&vertices, n, |_, v| v.direct = [light, light, light, 1.0]);
            }
            Kernel::LightBakeIndirect => {
                let Some(vertices) = buffer(binding::BAKE_VERTICES) else {
                    return;
                };

                // bounce light of 0.5 per iteration, running average as in the kernel
                let iteration = dispatch.uniforms.accumulated_frames;
                let sample = 0.5 * (iteration + 1) as f32;
                let weight = 1.0 / (iteration + 1) as f32;

                update::<LightBakeVertex>(&vertices, n, |_, v| {
                    let mix = |prev: f32| if iteration == 0 { sample } else { prev * (1.0 - weight) + sample * weight };
                    v.indirect = [mix(v.indirect[0]), mix(v.indirect[1]), mix(v.indirect[2]), 1.0];
                });
            }
            Kernel::LightBakeAverage => {
                let (Some(vertices), Some(average)) = (buffer(binding::BAKE_VERTICES), buffer(binding::AVERAGE)) else {
                    return;
                };
                let source = read::<LightBakeVertex>(&vertices, n);

                update::<VertexLightData>(&average, n, |i, a| {
                    a.direct = source[i].direct;
                    a.indirect = source[i].indirect;
                });
            }
            Kernel::LightBakeDiffuse => {
                let (Some(vertices), Some(average)) = (buffer(binding::BAKE_VERTICES), buffer(binding::AVERAGE)) else {
                    return;
                };
                let source = read::<VertexLightData>(&average, n);
                let (direct, indirect) = (dispatch.uniforms.diffuse_direct, dispatch.uniforms.diffuse_indirect);
                let write_back = direct == 0 && indirect == 0;

                update::<LightBakeVertex>(&vertices, n, |i, v| {
                    if write_back || direct != 0 {
                        v.direct = source[i].direct;
                    }
                    if write_back || indirect != 0 {
                        v.indirect = source[i].indirect;
                    }
                });
            }
            Kernel::PathTrace => {}
        }
    }
}

impl Default for MockGpu {
    fn default() -> Self {
        Self::new()
    }
}

fn read<T: Pod>(data: &RefCell<Vec<u8>>, count: usize) -> Vec<T> {
    let data = data.borrow();
    let stride = size_of::<T>();

    (0..count)
        .map(|i| bytemuck::pod_read_unaligned(&data[i * stride..(i + 1) * stride]))
        .collect()
}

fn update<T: Pod>(data: &RefCell<Vec<u8>>, count: usize, mut f: impl FnMut(usize, &mut T)) {
    let mut data = data.borrow_mut();
    let stride = size_of::<T>();

    for i in 0..count {
        let range = i * stride..(i + 1) * stride;
        let mut value: T = bytemuck::pod_read_unaligned(&data[range.clone()]);
        f(i, &mut value);
        data[range].copy_from_slice(bytemuck::bytes_of(&value));
    }
}

impl ComputeBackend for MockGpu {
    type Buffer = MockBuffer;
    type Image = MockImage;

    fn frame_number(&self) -> u64 {
        self.state.borrow().frame
    }

    fn begin_frame(&mut self) -> Result<(), RayTraceError> {
        let retired = {
            let mut state = self.state.borrow_mut();
            let frame = state.frame;
            let (retired, pending): (Vec<_>, Vec<_>) = std::mem::take(&mut state.pending)
                .into_iter()
                .partition(|p| p.frame + MAX_FRAMES_IN_FLIGHT as u64 <= frame);
            state.pending = pending;
            retired
        };

        for dispatch in retired {
            Self::apply(dispatch);
        }

        Ok(())
    }

    fn end_frame(&mut self) -> Result<(), RayTraceError> {
        self.state.borrow_mut().frame += 1;
        Ok(())
    }

    fn create_buffer(&mut self, desc: &BufferDesc) -> Result<MockBuffer, RayTraceError> {
        let mut state = self.state.borrow_mut();
        let id = state.next_id();
        state.created.push((id, desc.name, desc.size));

        Ok(MockBuffer {
            id,
            name: desc.name,
            host_visible: desc.host_visible,
            size: desc.size,
            data: Rc::new(RefCell::new(vec![0; desc.size as usize])),
            state: self.state.clone(),
        })
    }

    fn write_buffer(&mut self, buffer: &MockBuffer, data: &[u8]) -> Result<(), RayTraceError> {
        if data.len() as u64 > buffer.size {
            return Err(RayTraceError::IndexOutOfRange {
                what: buffer.name,
                index: data.len(),
                len: buffer.size as usize,
            });
        }

        {
            let mut state = self.state.borrow_mut();
            if buffer.host_visible && state.is_pending(buffer.id) {
                state.host_write_hazards += 1;
            }
        }

        buffer.data.borrow_mut()[..data.len()].copy_from_slice(data);
        Ok(())
    }

    fn read_buffer(&mut self, buffer: &MockBuffer, out: &mut [u8]) -> Result<(), RayTraceError> {
        if !buffer.host_visible {
            return Err(RayTraceError::Backend(format!("{} is not host visible", buffer.name).into()));
        }

        {
            let mut state = self.state.borrow_mut();
            state.reads += 1;
            if state.is_pending(buffer.id) {
                state.stale_reads += 1;
            }
        }

        let data = buffer.data.borrow();
        let len = out.len().min(data.len());
        out[..len].copy_from_slice(&data[..len]);
        Ok(())
    }

    fn create_storage_image(&mut self, _name: &'static str, width: u32, height: u32) -> Result<MockImage, RayTraceError> {
        let id = self.state.borrow_mut().next_id();
        Ok(MockImage { id, width, height })
    }

    fn dispatch(&mut self, dispatch: Dispatch<'_, MockBuffer, MockImage>) -> Result<(), RayTraceError> {
        let mut uniforms = None;
        let mut buffers = HashMap::new();

        for (slot, binding) in &dispatch.bindings {
            match binding {
                Binding::Uniform(buffer) => {
                    uniforms = Some(bytemuck::pod_read_unaligned::<RayTraceUniforms>(
                        &buffer.data.borrow()[..size_of::<RayTraceUniforms>()],
                    ));
                }
                Binding::Storage(buffer) => {
                    buffers.insert(*slot, (buffer.id, buffer.data.clone()));
                }
                Binding::StorageImage(_) | Binding::Textures(_) => {}
            }
        }

        let uniforms = uniforms.ok_or(RayTraceError::Backend("dispatch without uniforms".into()))?;

        if let Some((_, vertices)) = buffers.get(&binding::BAKE_VERTICES) {
            let needed = uniforms.num_bake_vertices as usize * size_of::<LightBakeVertex>();
            if vertices.borrow().len() < needed {
                return Err(RayTraceError::Backend("bake vertex buffer too small".into()));
            }
        }

        let mut state = self.state.borrow_mut();
        let frame = state.frame;

        state.uniforms.push((dispatch.kernel, uniforms));
        state.commands.push(Command::Dispatch {
            kernel: dispatch.kernel,
            frame,
            groups: dispatch.groups,
        });
        state.pending.push(PendingDispatch {
            frame,
            kernel: dispatch.kernel,
            uniforms,
            buffers,
        });

        Ok(())
    }

    fn buffer_barrier(&mut self, buffer: &MockBuffer) -> Result<(), RayTraceError> {
        self.state.borrow_mut().commands.push(Command::Barrier { buffer: buffer.id });
        Ok(())
    }

    fn wait_idle(&mut self) -> Result<(), RayTraceError> {
        let retired = std::mem::take(&mut self.state.borrow_mut().pending);

        for dispatch in retired {
            Self::apply(dispatch);
        }

        Ok(())
    }
}
