//! The embedding boundary between the language runtime and the pixel
//! pipeline it draws into. `ply-script` stays decoupled from `ply-display`'s
//! rendering internals, only borrowing `ply-pixel::Color` for background
//! colors: a theme crate implements this trait against `ply-pixel`/
//! `ply-display` handles and hands it to an `Evaluator`, so `ImageNew`/
//! `Sprite._New` and friends (script-lib-image.c, script-lib-sprite.c)
//! resolve to real drawing operations without the language core knowing
//! what a pixel is.

use ply_pixel::Color;

/// Opaque handle to a host-managed image. Scripts never see the inside of
/// one; they pass the handle back into other `ImageXxx`/`SpriteXxx` calls.
pub type ImageHandle = u64;
pub type SpriteHandle = u64;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImageSize {
    pub width: u32,
    pub height: u32,
}

pub trait ScriptHost {
    /// Load an image by path, resolving the `special://logo` prefix to the
    /// boot logo the way `script-lib-image.c`'s `ImageNew` does.
    fn image_new(&mut self, path: &str) -> Option<ImageHandle>;
    fn image_size(&self, image: ImageHandle) -> Option<ImageSize>;
    fn image_rotate(&mut self, image: ImageHandle, angle_radians: f64) -> Option<ImageHandle>;
    fn image_scale(&mut self, image: ImageHandle, width: u32, height: u32) -> Option<ImageHandle>;

    fn sprite_new(&mut self) -> SpriteHandle;
    fn sprite_set_image(&mut self, sprite: SpriteHandle, image: Option<ImageHandle>);
    fn sprite_set_x(&mut self, sprite: SpriteHandle, x: f64);
    fn sprite_set_y(&mut self, sprite: SpriteHandle, y: f64);
    fn sprite_set_z(&mut self, sprite: SpriteHandle, z: f64);
    fn sprite_set_opacity(&mut self, sprite: SpriteHandle, opacity: f64);
    fn sprite_remove(&mut self, sprite: SpriteHandle);

    fn window_size(&self) -> ImageSize;
    fn window_set_background_top_color(&mut self, color: Color);
    fn window_set_background_bottom_color(&mut self, color: Color);
}

/// A host that records nothing and draws nothing, used by `ply-script`'s
/// own unit tests so the evaluator can run scripts without a real display.
pub struct NullHost;

impl ScriptHost for NullHost {
    fn image_new(&mut self, _path: &str) -> Option<ImageHandle> {
        Some(0)
    }

    fn image_size(&self, _image: ImageHandle) -> Option<ImageSize> {
        Some(ImageSize { width: 0, height: 0 })
    }

    fn image_rotate(&mut self, image: ImageHandle, _angle_radians: f64) -> Option<ImageHandle> {
        Some(image)
    }

    fn image_scale(&mut self, image: ImageHandle, _width: u32, _height: u32) -> Option<ImageHandle> {
        Some(image)
    }

    fn sprite_new(&mut self) -> SpriteHandle {
        0
    }

    fn sprite_set_image(&mut self, _sprite: SpriteHandle, _image: Option<ImageHandle>) {}
    fn sprite_set_x(&mut self, _sprite: SpriteHandle, _x: f64) {}
    fn sprite_set_y(&mut self, _sprite: SpriteHandle, _y: f64) {}
    fn sprite_set_z(&mut self, _sprite: SpriteHandle, _z: f64) {}
    fn sprite_set_opacity(&mut self, _sprite: SpriteHandle, _opacity: f64) {}
    fn sprite_remove(&mut self, _sprite: SpriteHandle) {}

    fn window_size(&self) -> ImageSize {
        ImageSize { width: 0, height: 0 }
    }

    fn window_set_background_top_color(&mut self, _color: Color) {}
    fn window_set_background_bottom_color(&mut self, _color: Color) {}
}
