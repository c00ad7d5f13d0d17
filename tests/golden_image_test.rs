#[cfg(feature = "integration-tests")]
mod common;

#[cfg(feature = "integration-tests")]
mod gpu {
    use defer_ngin::{
        config::RendererConfig,
        context::RenderContext,
        data_structures::mesh::MeshResource,
        device::gpu::{GpuOptions, WgpuDevice},
        render::RenderPipeline,
    };

    use crate::common::test_utils::triangle_data;

    async fn headless_frame(
        config: RendererConfig,
        with_triangle: bool,
        (width, height): (u32, u32),
    ) -> image::RgbaImage {
        let _ = env_logger::builder().is_test(true).try_init();
        let device = WgpuDevice::headless(width, height, &GpuOptions::default())
            .await
            .expect("a GPU adapter");
        let mut ctx = RenderContext::new(device);
        let mut pipeline = RenderPipeline::new(&mut ctx, config).unwrap();
        pipeline.resize(&mut ctx, width, height).unwrap();
        if with_triangle {
            let data = triangle_data();
            let mesh = MeshResource::create(
                &mut ctx,
                "tri",
                &data.positions,
                &data.colors,
                &data.uvs,
                &data.normals,
            )
            .unwrap();
            pipeline.add_actor(&mut ctx, "tri", mesh).unwrap();
        }

        ctx.request_capture();
        ctx.begin_frame().unwrap();
        pipeline.render_frame(&mut ctx, 0.0).unwrap();
        ctx.end_frame().unwrap();
        let image = ctx.take_capture().expect("captured frame");
        pipeline.teardown(&mut ctx);
        image
    }

    #[tokio::test]
    async fn should_render_clear_colour() {
        let config = RendererConfig {
            clear_colour: [1.0, 1.0, 1.0, 1.0],
            ..RendererConfig::default()
        };
        let image = headless_frame(config, false, (64, 48)).await;
        assert_eq!(image.dimensions(), (64, 48));
        for pixel in image.pixels() {
            assert_eq!(*pixel, image::Rgba([255, 255, 255, 255]));
        }
    }

    #[tokio::test]
    async fn should_shade_geometry_over_background() {
        let config = RendererConfig {
            clear_colour: [0.0, 0.0, 0.0, 1.0],
            backface_culling: false,
            ..RendererConfig::default()
        };
        let (width, height) = (128, 128);
        let image = headless_frame(config, true, (width, height)).await;

        // The triangle spans the upper right quadrant around the centre.
        let lit = image.get_pixel(width / 2 + 8, height / 2 - 8);
        assert_ne!(&lit.0[..3], &[0u8, 0, 0]);
        let corner = image.get_pixel(2, height - 3);
        assert_eq!(*corner, image::Rgba([0, 0, 0, 255]));
    }
}
