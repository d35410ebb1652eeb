/// Native structs built from recorded command parameters

use ash::vk;
use nebula_engine::nebula::device::{BarrierBatch, RenderingAttachment};
use nebula_engine::nebula::Result;

use crate::vulkan_conversions::*;
use crate::vulkan_resources::ResourceTables;

/// Image memory barriers of `batch` plus the merged stage masks
pub(crate) fn image_barriers(
    tables: &ResourceTables,
    batch: &BarrierBatch,
    ray_tracing: bool,
) -> Result<(Vec<vk::ImageMemoryBarrier<'static>>, vk::PipelineStageFlags, vk::PipelineStageFlags)> {
    let barriers = batch
        .barriers()
        .iter()
        .map(|barrier| {
            let image = tables.image(barrier.image)?.image;
            Ok(vk::ImageMemoryBarrier::default()
                .image(image)
                .old_layout(image_layout_to_vk(barrier.old_layout))
                .new_layout(image_layout_to_vk(barrier.new_layout))
                .src_access_mask(access_to_vk(barrier.src_access))
                .dst_access_mask(access_to_vk(barrier.dst_access))
                .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .subresource_range(vk::ImageSubresourceRange {
                    aspect_mask: aspect_to_vk(barrier.aspect),
                    base_mip_level: 0,
                    level_count: 1,
                    base_array_layer: barrier.base_layer,
                    layer_count: barrier.layer_count,
                }))
        })
        .collect::<Result<Vec<_>>>()?;
    Ok((
        barriers,
        pipeline_stage_to_vk(batch.src_stage(), ray_tracing),
        pipeline_stage_to_vk(batch.dst_stage(), ray_tracing),
    ))
}

/// Dynamic rendering attachment, with an averaging resolve when requested
pub(crate) fn rendering_attachment(
    tables: &ResourceTables,
    attachment: &RenderingAttachment,
) -> Result<vk::RenderingAttachmentInfo<'static>> {
    let mut info = vk::RenderingAttachmentInfo::default()
        .image_view(tables.image_view(attachment.view)?)
        .image_layout(image_layout_to_vk(attachment.layout))
        .load_op(load_op_to_vk(attachment.load))
        .store_op(store_op_to_vk(attachment.store))
        .clear_value(load_clear_value(attachment.load));
    if let Some((view, layout)) = attachment.resolve {
        info = info
            .resolve_mode(vk::ResolveModeFlags::AVERAGE)
            .resolve_image_view(tables.image_view(view)?)
            .resolve_image_layout(image_layout_to_vk(layout));
    }
    Ok(info)
}

#[cfg(test)]
#[path = "vulkan_commands_tests.rs"]
mod tests;
