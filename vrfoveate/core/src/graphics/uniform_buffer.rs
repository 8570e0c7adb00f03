use super::Backend;
use crate::{data::Eye, StrResult};
use bytemuck::Pod;
use std::{marker::PhantomData, mem::size_of};

const TRACE_CONTEXT: &str = "Graphics";

// One constant buffer per eye. Both eyes of a frame are processed without a GPU sync point in
// between, so the right eye must never overwrite the buffer the left eye draw is still reading.
pub struct EyeConstants<B: Backend, T: Pod> {
    buffers: [B::ConstantBuffer; 2],
    struct_type: PhantomData<T>,
}

impl<B: Backend, T: Pod> EyeConstants<B, T> {
    pub fn new(backend: &B, name: &str) -> StrResult<Self> {
        let create = || {
            trace_err!(
                backend.create_constant_buffer(size_of::<T>()),
                "Creating {} constants buffer",
                name
            )
        };

        Ok(Self {
            buffers: [create()?, create()?],
            struct_type: PhantomData,
        })
    }

    // Writes the whole struct for the given eye and returns the buffer to bind
    pub fn write(&self, backend: &B, eye: Eye, data: &T) -> StrResult<&B::ConstantBuffer> {
        let buffer = &self.buffers[eye.index()];
        backend.write_constant_buffer(buffer, bytemuck::bytes_of(data))?;

        Ok(buffer)
    }
}
