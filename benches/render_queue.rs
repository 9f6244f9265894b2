use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};
use pinta::{
    Color, ColorAllocator, DrawImageRequest, PipelineConfig, RenderContext, RenderPipeline,
    RenderQueue, ShaderId, SoftwareContext, Sprite,
};

const LEAVES: usize = 10_000;

/// Pseudo-random but reproducible y keys.
fn y_key(index: usize) -> f32 {
    ((index * 7919) % 1024) as f32
}

fn build_queue(containers: usize) -> RenderQueue<u64> {
    let mut queue = RenderQueue::new();
    let per_container = LEAVES / containers.max(1);
    for container in 0..containers.max(1) {
        if containers > 0 {
            queue.open_container([0.0, y_key(container)], &[ShaderId(container as u64)]);
        }
        for leaf in 0..per_container {
            queue.enqueue_renderable(
                [0.0, y_key(container * per_container + leaf)],
                |sum: &mut u64, inherited: &[ShaderId]| {
                    *sum += inherited.len() as u64 + 1;
                    Ok(())
                },
            );
        }
        if containers > 0 {
            queue
                .close_container()
                .expect("every opened container is closed");
        }
    }
    queue
}

fn queue_benchmarks(c: &mut Criterion) {
    c.bench_function("enqueue_10k_flat", |b| b.iter(|| black_box(build_queue(0))));

    for containers in [0, 100] {
        c.bench_function(&format!("draw_frame_10k_{containers}_containers"), |b| {
            b.iter_batched(
                || build_queue(containers),
                |mut queue| {
                    let mut sum = 0u64;
                    queue.draw_frame(&mut sum).expect("leaves never fail");
                    black_box(sum)
                },
                BatchSize::LargeInput,
            )
        });
    }
}

fn color_allocator_benchmarks(c: &mut Criterion) {
    c.bench_function("allocate_100k_colors", |b| {
        b.iter(|| {
            let mut allocator = ColorAllocator::new();
            for _ in 0..100_000 {
                black_box(allocator.next_color());
            }
        })
    });
}

fn software_frame_benchmarks(c: &mut Criterion) {
    let mut pipeline = RenderPipeline::new(
        SoftwareContext::new(256, 256),
        PipelineConfig::default(),
    )
    .expect("software pipeline");
    let texture = pipeline
        .context_mut()
        .upload_texture(1, 1, &Color::WHITE.to_array())
        .expect("texture upload");

    c.bench_function("software_frame_256_sprites", |b| {
        b.iter(|| {
            for index in 0..256 {
                let origin = ((index % 16) as f32 * 16.0, (index / 16) as f32 * 16.0);
                let request =
                    DrawImageRequest::new(pipeline.sprite_shader(), texture, (1, 1), origin)
                        .destination_size(16.0, 16.0);
                pipeline.enqueue_sprite(
                    [origin.0, origin.1],
                    Sprite::new(request).with_object(pinta::ObjectId(index)),
                );
            }
            black_box(pipeline.draw_frame().expect("frame"))
        })
    });
}

criterion_group!(
    benches,
    queue_benchmarks,
    color_allocator_benchmarks,
    software_frame_benchmarks
);
criterion_main!(benches);
