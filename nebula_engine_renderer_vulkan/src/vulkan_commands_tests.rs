//! Unit tests for vulkan_commands.rs

use super::*;
use crate::vulkan_resources::{ImageRecord, ImageViewRecord};
use nebula_engine::nebula::device::*;
use nebula_engine::nebula::Error;

fn tables_with_image() -> (ResourceTables, ImageHandle, ImageViewHandle) {
    let mut tables = ResourceTables::default();
    let image = tables.images.insert(ImageRecord {
        image: vk::Image::null(),
        allocation: None,
        format: Format::D32_SFLOAT,
        extent: Extent2D::new(1024, 1024),
        swapchain: false,
    });
    let view = tables.image_views.insert(ImageViewRecord { view: vk::ImageView::null(), image, swapchain: false });
    (tables, image, view)
}

#[test]
fn test_barrier_batch_translation() {
    let (tables, image, _) = tables_with_image();
    let batch = BarrierBatch::from(
        ImageBarrier::transition(image, Format::D32_SFLOAT, ImageLayout::Undefined, ImageLayout::DepthAttachment)
            .layers(0, 6),
    );

    let (barriers, src, dst) = image_barriers(&tables, &batch, false).unwrap();
    assert_eq!(barriers.len(), 1);
    assert_eq!(barriers[0].old_layout, vk::ImageLayout::UNDEFINED);
    assert_eq!(barriers[0].new_layout, vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL);
    assert_eq!(barriers[0].subresource_range.aspect_mask, vk::ImageAspectFlags::DEPTH);
    assert_eq!(barriers[0].subresource_range.layer_count, 6);
    assert_eq!(src, vk::PipelineStageFlags::TOP_OF_PIPE);
    assert!(dst.contains(vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS));
}

#[test]
fn test_barrier_on_destroyed_image_fails() {
    let (mut tables, image, _) = tables_with_image();
    tables.images.remove(image);
    let batch = BarrierBatch::from(ImageBarrier::transition(
        image,
        Format::D32_SFLOAT,
        ImageLayout::Undefined,
        ImageLayout::DepthAttachment,
    ));
    assert!(matches!(image_barriers(&tables, &batch, false), Err(Error::InvalidResource(_))));
}

#[test]
fn test_rendering_attachment_clear_and_resolve() {
    let (tables, _, view) = tables_with_image();
    let attachment = RenderingAttachment {
        view,
        layout: ImageLayout::ColorAttachment,
        load: LoadOp::Clear(ClearValue::Color([0.1, 0.2, 0.3, 1.0])),
        store: StoreOp::DontCare,
        resolve: Some((view, ImageLayout::ColorAttachment)),
    };
    let info = rendering_attachment(&tables, &attachment).unwrap();
    assert_eq!(info.load_op, vk::AttachmentLoadOp::CLEAR);
    assert_eq!(info.store_op, vk::AttachmentStoreOp::DONT_CARE);
    assert_eq!(info.resolve_mode, vk::ResolveModeFlags::AVERAGE);
    assert_eq!(unsafe { info.clear_value.color.float32[2] }, 0.3);
}

#[test]
fn test_rendering_attachment_without_resolve() {
    let (tables, _, view) = tables_with_image();
    let attachment = RenderingAttachment {
        view,
        layout: ImageLayout::DepthAttachment,
        load: LoadOp::Load,
        store: StoreOp::Store,
        resolve: None,
    };
    let info = rendering_attachment(&tables, &attachment).unwrap();
    assert_eq!(info.load_op, vk::AttachmentLoadOp::LOAD);
    assert_eq!(info.resolve_mode, vk::ResolveModeFlags::NONE);
}
