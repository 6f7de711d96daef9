//! `Image*` global functions, grounded on `script-lib-image.c`. An image
//! object is a plain hash carrying a `__handle` field; scripts never
//! construct one directly, only through `ImageNew`/`ImageRotate`/`ImageScale`.

use crate::eval::Evaluator;
use crate::native::NativeFunction;
use crate::object::{new_hash, new_int, new_null, ObjRef, ScriptObj};
use crate::state::ScriptState;

const HANDLE_KEY: &str = "__image_handle";

fn wrap_handle(handle: u64) -> ObjRef {
    let hash = new_hash();
    ScriptState::set_in(&hash, HANDLE_KEY, new_int(handle as i64));
    hash
}

fn unwrap_handle(obj: &ObjRef) -> Option<u64> {
    match &*obj.borrow() {
        ScriptObj::Hash(h) => h.get(HANDLE_KEY).map(|v| v.borrow().as_i64() as u64),
        _ => None,
    }
}

fn arg(args: &[ObjRef], i: usize) -> ObjRef {
    args.get(i).cloned().unwrap_or_else(new_null)
}

pub fn install(eval: &mut Evaluator) {
    let global = eval.state.global.clone();

    ScriptState::set_in(
        &global,
        "ImageNew",
        wrap_native(NativeFunction::new("ImageNew", |eval: &mut Evaluator, args: &[ObjRef]| {
            let path = arg(args, 0).borrow().to_display_string();
            match eval.host.image_new(&path) {
                Some(handle) => Ok(wrap_handle(handle)),
                None => Ok(new_null()),
            }
        })),
    );

    ScriptState::set_in(
        &global,
        "ImageRotate",
        wrap_native(NativeFunction::new("ImageRotate", |eval: &mut Evaluator, args: &[ObjRef]| {
            let Some(handle) = unwrap_handle(&arg(args, 0)) else { return Ok(new_null()) };
            let angle = arg(args, 1).borrow().as_f64();
            match eval.host.image_rotate(handle, angle) {
                Some(rotated) => Ok(wrap_handle(rotated)),
                None => Ok(new_null()),
            }
        })),
    );

    ScriptState::set_in(
        &global,
        "ImageScale",
        wrap_native(NativeFunction::new("ImageScale", |eval: &mut Evaluator, args: &[ObjRef]| {
            let Some(handle) = unwrap_handle(&arg(args, 0)) else { return Ok(new_null()) };
            let width = arg(args, 1).borrow().as_i64().max(0) as u32;
            let height = arg(args, 2).borrow().as_i64().max(0) as u32;
            match eval.host.image_scale(handle, width, height) {
                Some(scaled) => Ok(wrap_handle(scaled)),
                None => Ok(new_null()),
            }
        })),
    );

    ScriptState::set_in(
        &global,
        "ImageGetWidth",
        wrap_native(NativeFunction::new("ImageGetWidth", |eval: &mut Evaluator, args: &[ObjRef]| {
            let Some(handle) = unwrap_handle(&arg(args, 0)) else { return Ok(new_int(0)) };
            Ok(new_int(eval.host.image_size(handle).map(|s| s.width).unwrap_or(0) as i64))
        })),
    );

    ScriptState::set_in(
        &global,
        "ImageGetHeight",
        wrap_native(NativeFunction::new("ImageGetHeight", |eval: &mut Evaluator, args: &[ObjRef]| {
            let Some(handle) = unwrap_handle(&arg(args, 0)) else { return Ok(new_int(0)) };
            Ok(new_int(eval.host.image_size(handle).map(|s| s.height).unwrap_or(0) as i64))
        })),
    );
}

fn wrap_native(f: std::rc::Rc<NativeFunction>) -> ObjRef {
    std::rc::Rc::new(std::cell::RefCell::new(ScriptObj::Native(f)))
}

pub(crate) fn image_handle_of(obj: &ObjRef) -> Option<u64> {
    unwrap_handle(obj)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{ImageSize, NullHost, ScriptHost};

    struct CountingHost {
        next: u64,
    }

    impl ScriptHost for CountingHost {
        fn image_new(&mut self, _path: &str) -> Option<u64> {
            self.next += 1;
            Some(self.next)
        }
        fn image_size(&self, image: u64) -> Option<ImageSize> {
            Some(ImageSize { width: image as u32 * 10, height: image as u32 * 20 })
        }
        fn image_rotate(&mut self, image: u64, _angle_radians: f64) -> Option<u64> {
            Some(image)
        }
        fn image_scale(&mut self, image: u64, _w: u32, _h: u32) -> Option<u64> {
            Some(image)
        }
        fn sprite_new(&mut self) -> u64 {
            0
        }
        fn sprite_set_image(&mut self, _: u64, _: Option<u64>) {}
        fn sprite_set_x(&mut self, _: u64, _: f64) {}
        fn sprite_set_y(&mut self, _: u64, _: f64) {}
        fn sprite_set_z(&mut self, _: u64, _: f64) {}
        fn sprite_set_opacity(&mut self, _: u64, _: f64) {}
        fn sprite_remove(&mut self, _: u64) {}
        fn window_size(&self) -> ImageSize {
            ImageSize { width: 0, height: 0 }
        }
        fn window_set_background_top_color(&mut self, _: ply_pixel::Color) {}
        fn window_set_background_bottom_color(&mut self, _: ply_pixel::Color) {}
    }

    #[test]
    fn image_new_then_get_width_round_trips_through_the_host() {
        let mut eval = Evaluator::new(Box::new(CountingHost { next: 0 }));
        install(&mut eval);
        let program = crate::parser::parse_program(
            r#"img = ImageNew("logo.png"); w = ImageGetWidth(img); h = ImageGetHeight(img);"#,
        )
        .unwrap();
        eval.run(&program).unwrap();
        assert_eq!(eval.state.get_var("w").borrow().as_i64(), 10);
        assert_eq!(eval.state.get_var("h").borrow().as_i64(), 20);
    }

    #[test]
    fn null_host_image_calls_do_not_panic() {
        let mut eval = Evaluator::new(Box::new(NullHost));
        install(&mut eval);
        let program = crate::parser::parse_program(r#"img = ImageNew("x.png");"#).unwrap();
        eval.run(&program).unwrap();
        assert!(image_handle_of(&eval.state.get_var("img")).is_some());
    }
}
