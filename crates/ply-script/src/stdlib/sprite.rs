//! `Sprite._New()` and the `Window` singleton, grounded on
//! `script-lib-sprite.c`. Each sprite instance is a hash whose methods
//! are native closures bound to that instance's host-side handle, so
//! `sprite.SetX(10)` reads naturally in script source while dispatching
//! straight to the embedding display layer.

use std::rc::Rc;

use super::image::image_handle_of;
use crate::eval::Evaluator;
use crate::native::NativeFunction;
use crate::object::{new_hash, new_int, new_null, ObjRef, ScriptObj};
use crate::state::ScriptState;

fn wrap_native(f: Rc<NativeFunction>) -> ObjRef {
    Rc::new(std::cell::RefCell::new(ScriptObj::Native(f)))
}

fn arg(args: &[ObjRef], i: usize) -> ObjRef {
    args.get(i).cloned().unwrap_or_else(new_null)
}

pub fn install(eval: &mut Evaluator) {
    let global = eval.state.global.clone();

    let sprite_namespace = new_hash();
    ScriptState::set_in(
        &sprite_namespace,
        "_New",
        wrap_native(NativeFunction::new("Sprite._New", |eval: &mut Evaluator, _args: &[ObjRef]| {
            Ok(new_sprite_instance(eval))
        })),
    );
    ScriptState::set_in(&global, "Sprite", sprite_namespace);

    let window = new_hash();
    ScriptState::set_in(
        &window,
        "GetWidth",
        wrap_native(NativeFunction::new("Window.GetWidth", |eval: &mut Evaluator, _args: &[ObjRef]| {
            Ok(new_int(eval.host.window_size().width as i64))
        })),
    );
    ScriptState::set_in(
        &window,
        "GetHeight",
        wrap_native(NativeFunction::new("Window.GetHeight", |eval: &mut Evaluator, _args: &[ObjRef]| {
            Ok(new_int(eval.host.window_size().height as i64))
        })),
    );
    ScriptState::set_in(
        &window,
        "SetBackgroundTopColor",
        wrap_native(NativeFunction::new("Window.SetBackgroundTopColor", |eval: &mut Evaluator, args: &[ObjRef]| {
            eval.host.window_set_background_top_color(color_from_args(args));
            Ok(new_null())
        })),
    );
    ScriptState::set_in(
        &window,
        "SetBackgroundBottomColor",
        wrap_native(NativeFunction::new("Window.SetBackgroundBottomColor", |eval: &mut Evaluator, args: &[ObjRef]| {
            eval.host.window_set_background_bottom_color(color_from_args(args));
            Ok(new_null())
        })),
    );
    ScriptState::set_in(&global, "Window", window);
}

fn color_from_args(args: &[ObjRef]) -> ply_pixel::Color {
    let r = arg(args, 0).borrow().as_f64() as f32;
    let g = arg(args, 1).borrow().as_f64() as f32;
    let b = arg(args, 2).borrow().as_f64() as f32;
    ply_pixel::Color::new(r, g, b, 1.0)
}

const HANDLE_KEY: &str = "__sprite_handle";

fn new_sprite_instance(eval: &mut Evaluator) -> ObjRef {
    let handle = eval.host.sprite_new();
    let sprite = new_hash();
    ScriptState::set_in(&sprite, HANDLE_KEY, new_int(handle as i64));

    ScriptState::set_in(
        &sprite,
        "SetImage",
        wrap_native(NativeFunction::new("Sprite.SetImage", move |eval: &mut Evaluator, args: &[ObjRef]| {
            let image = image_handle_of(&arg(args, 0));
            eval.host.sprite_set_image(handle, image);
            Ok(new_null())
        })),
    );
    ScriptState::set_in(
        &sprite,
        "SetX",
        wrap_native(NativeFunction::new("Sprite.SetX", move |eval: &mut Evaluator, args: &[ObjRef]| {
            eval.host.sprite_set_x(handle, arg(args, 0).borrow().as_f64());
            Ok(new_null())
        })),
    );
    ScriptState::set_in(
        &sprite,
        "SetY",
        wrap_native(NativeFunction::new("Sprite.SetY", move |eval: &mut Evaluator, args: &[ObjRef]| {
            eval.host.sprite_set_y(handle, arg(args, 0).borrow().as_f64());
            Ok(new_null())
        })),
    );
    ScriptState::set_in(
        &sprite,
        "SetZ",
        wrap_native(NativeFunction::new("Sprite.SetZ", move |eval: &mut Evaluator, args: &[ObjRef]| {
            eval.host.sprite_set_z(handle, arg(args, 0).borrow().as_f64());
            Ok(new_null())
        })),
    );
    ScriptState::set_in(
        &sprite,
        "SetOpacity",
        wrap_native(NativeFunction::new("Sprite.SetOpacity", move |eval: &mut Evaluator, args: &[ObjRef]| {
            eval.host.sprite_set_opacity(handle, arg(args, 0).borrow().as_f64());
            Ok(new_null())
        })),
    );
    ScriptState::set_in(
        &sprite,
        "Remove",
        wrap_native(NativeFunction::new("Sprite.Remove", move |eval: &mut Evaluator, _args: &[ObjRef]| {
            eval.host.sprite_remove(handle);
            Ok(new_null())
        })),
    );

    sprite
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{ImageSize, ScriptHost};
    use std::cell::RefCell;

    #[derive(Default)]
    struct RecordingHost {
        xs: RefCell<Vec<(u64, f64)>>,
        opacities: RefCell<Vec<(u64, f64)>>,
        removed: RefCell<Vec<u64>>,
        next_sprite: RefCell<u64>,
    }

    impl ScriptHost for RecordingHost {
        fn image_new(&mut self, _path: &str) -> Option<u64> {
            Some(1)
        }
        fn image_size(&self, _image: u64) -> Option<ImageSize> {
            Some(ImageSize { width: 1, height: 1 })
        }
        fn image_rotate(&mut self, image: u64, _angle_radians: f64) -> Option<u64> {
            Some(image)
        }
        fn image_scale(&mut self, image: u64, _w: u32, _h: u32) -> Option<u64> {
            Some(image)
        }
        fn sprite_new(&mut self) -> u64 {
            let mut n = self.next_sprite.borrow_mut();
            *n += 1;
            *n
        }
        fn sprite_set_image(&mut self, _: u64, _: Option<u64>) {}
        fn sprite_set_x(&mut self, sprite: u64, x: f64) {
            self.xs.borrow_mut().push((sprite, x));
        }
        fn sprite_set_y(&mut self, _sprite: u64, _y: f64) {}
        fn sprite_set_z(&mut self, _sprite: u64, _z: f64) {}
        fn sprite_set_opacity(&mut self, sprite: u64, opacity: f64) {
            self.opacities.borrow_mut().push((sprite, opacity));
        }
        fn sprite_remove(&mut self, sprite: u64) {
            self.removed.borrow_mut().push(sprite);
        }
        fn window_size(&self) -> ImageSize {
            ImageSize { width: 800, height: 600 }
        }
        fn window_set_background_top_color(&mut self, _: ply_pixel::Color) {}
        fn window_set_background_bottom_color(&mut self, _: ply_pixel::Color) {}
    }

    #[test]
    fn sprite_new_set_opacity_and_remove_dispatch_to_the_host() {
        let mut eval = Evaluator::new(Box::new(RecordingHost::default()));
        install(&mut eval);
        let program = crate::parser::parse_program(
            "s = Sprite._New(); s.SetOpacity(0.5); s.SetX(10); s.Remove();",
        )
        .unwrap();
        eval.run(&program).unwrap();
    }

    #[test]
    fn window_get_width_and_height_reflect_the_host_screen_size() {
        let mut eval = Evaluator::new(Box::new(RecordingHost::default()));
        install(&mut eval);
        let program = crate::parser::parse_program("w = Window.GetWidth(); h = Window.GetHeight();").unwrap();
        eval.run(&program).unwrap();
        assert_eq!(eval.state.get_var("w").borrow().as_i64(), 800);
        assert_eq!(eval.state.get_var("h").borrow().as_i64(), 600);
    }
}
