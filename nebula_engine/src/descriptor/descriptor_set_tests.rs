//! Unit tests for descriptor_set.rs

use crate::descriptor::{pool_desc, DescriptorSet};
use crate::device::mock_device::MockDevice;
use crate::device::*;
use crate::error::Error;

fn bindings() -> Vec<DescriptorBinding> {
    vec![
        DescriptorBinding {
            binding: 0,
            descriptor_type: DescriptorType::UniformBuffer,
            count: 1,
            stages: ShaderStageFlags::VERTEX,
        },
        DescriptorBinding {
            binding: 1,
            descriptor_type: DescriptorType::CombinedImageSampler,
            count: 2,
            stages: ShaderStageFlags::FRAGMENT,
        },
    ]
}

fn uniform_buffer(device: &mut MockDevice) -> BufferHandle {
    device
        .create_buffer(&BufferDesc {
            size: 64,
            usage: BufferUsage::UNIFORM,
            location: MemoryLocation::CpuToGpu,
            label: "ubo".to_string(),
        })
        .unwrap()
}

#[test]
fn test_pool_is_sized_per_frame() {
    let desc = pool_desc(&bindings(), 2);
    assert_eq!(desc.max_sets, 2);
    assert_eq!(
        desc.pool_sizes,
        vec![(DescriptorType::UniformBuffer, 2), (DescriptorType::CombinedImageSampler, 4)]
    );
}

#[test]
fn test_one_set_per_frame_slot() {
    let mut device = MockDevice::new(3, Extent2D::new(800, 600));
    let set = DescriptorSet::new(&mut device, &bindings()).unwrap();

    assert_eq!(set.len(), 3);
    assert_ne!(set.set(0).unwrap(), set.set(1).unwrap());
    assert!(matches!(set.set(3), Err(Error::InvalidResource(_))));
}

#[test]
fn test_declarative_update_writes_every_frame() {
    let mut device = MockDevice::new(2, Extent2D::new(800, 600));
    let probe = device.probe();
    let buffers = [uniform_buffer(&mut device), uniform_buffer(&mut device)];
    let set = DescriptorSet::new(&mut device, &bindings()).unwrap();

    set.update(&mut device, |frame| {
        vec![DescriptorWrite {
            binding: 0,
            resource: DescriptorResource::Buffer { buffer: buffers[frame], offset: 0, range: 64 },
        }]
    })
    .unwrap();

    for frame in 0..2 {
        let writes = probe.descriptor_writes(set.set(frame).unwrap());
        assert_eq!(writes.len(), 1);
        assert!(matches!(writes[0].resource, DescriptorResource::Buffer { buffer, .. } if buffer == buffers[frame]));
    }
}

#[test]
fn test_update_rejects_unknown_binding_and_wrong_type() {
    let mut device = MockDevice::new(2, Extent2D::new(800, 600));
    let buffer = uniform_buffer(&mut device);
    let set = DescriptorSet::new(&mut device, &bindings()).unwrap();

    let unknown = DescriptorWrite {
        binding: 7,
        resource: DescriptorResource::Buffer { buffer, offset: 0, range: 64 },
    };
    assert!(set.update_frame(&mut device, 0, &[unknown]).is_err());

    let wrong_type = DescriptorWrite {
        binding: 1,
        resource: DescriptorResource::Buffer { buffer, offset: 0, range: 64 },
    };
    assert!(matches!(set.update_frame(&mut device, 0, &[wrong_type]), Err(Error::InvalidResource(_))));
}

#[test]
fn test_destroy_keeps_borrowed_layout() {
    let mut device = MockDevice::new(2, Extent2D::new(800, 600));
    let probe = device.probe();
    let layout = device.create_descriptor_set_layout(&bindings()).unwrap();
    let mut set = DescriptorSet::with_layout(&mut device, layout, &bindings()).unwrap();

    set.destroy(&mut device);
    set.destroy(&mut device);

    assert_eq!(probe.live_descriptor_pools(), 0);
    let pool = device.create_descriptor_pool(&pool_desc(&bindings(), 1)).unwrap();
    assert!(device.allocate_descriptor_sets(pool, layout, 1).is_ok());
}
