//! Loading a theme from a `.plymouth`-declared shared object (spec §4.7).
//!
//! Follows `ply-display`'s `fbdev.rs` template for foreign boundaries: a
//! `#[repr(C)]` struct mirrors the ABI exactly, every unsafe call gets a
//! `// SAFETY:` comment, and the unsafe surface is kept as small as the
//! kernel/ABI contract allows. Here the contract is the plugin's own:
//! a `cdylib` exports a single `ply_theme_get_vtable` symbol returning a
//! table of `extern "C"` function pointers, one per `ThemePlugin` method,
//! operating on an opaque `*mut c_void` instance handle the plugin itself
//! owns and frees.

use std::ffi::{c_char, c_void, CString};
use std::path::Path;

use libloading::{Library, Symbol};
use ply_core::{Error, Result};
use ply_device::Seat;

use crate::plugin::{Mode, ThemePlugin};

/// Mirrors the ABI a `.plymouth` module's `cdylib` must export. Every
/// entry takes the opaque instance pointer `create` returned, the same
/// shape `ply_boot_splash_plugin_interface_t` uses in the source with a
/// `void *user_data` thread through every callback.
#[repr(C)]
pub struct PluginVTable {
    pub create: unsafe extern "C" fn() -> *mut c_void,
    pub destroy: unsafe extern "C" fn(*mut c_void),
    pub show: unsafe extern "C" fn(*mut c_void, mode: u32) -> bool,
    pub hide: unsafe extern "C" fn(*mut c_void),
    pub update_status: unsafe extern "C" fn(*mut c_void, *const c_char),
    pub on_boot_progress: unsafe extern "C" fn(*mut c_void, f64, f64),
    pub display_normal: unsafe extern "C" fn(*mut c_void),
    pub display_message: unsafe extern "C" fn(*mut c_void, *const c_char),
    pub display_password: unsafe extern "C" fn(*mut c_void, *const c_char, usize),
    pub display_question: unsafe extern "C" fn(*mut c_void, *const c_char, *const c_char),
}

type GetVTableFn = unsafe extern "C" fn() -> *const PluginVTable;

const ENTRY_SYMBOL: &[u8] = b"ply_theme_get_vtable";

/// A theme whose implementation lives in a `dlopen`ed `.so`. Holds the
/// `Library` alive for as long as the instance handle is in use: dropping
/// it before `destroy` runs would unmap code `destroy` needs to execute.
pub struct DynamicTheme {
    _library: Library,
    vtable: *const PluginVTable,
    handle: *mut c_void,
}

impl DynamicTheme {
    /// Load `path`, resolve its vtable, and construct one instance.
    pub fn load(path: &Path) -> Result<Self> {
        // SAFETY: dlopen executes the module's static initializers; we
        // trust the same way the source trusts any plugin it `dlopen`s
        // from the themes directory root only populates with vetted files.
        let library = unsafe { Library::new(path) }
            .map_err(|e| Error::theme(format!("{}: {e}", path.display())))?;

        // SAFETY: `ENTRY_SYMBOL` is looked up by exact name and cast to
        // the `GetVTableFn` signature the module is required to export;
        // a mismatched export crashes on first call, same risk the C
        // loader takes calling `ply_boot_splash_plugin_get_interface`.
        let get_vtable: Symbol<GetVTableFn> = unsafe {
            library
                .get(ENTRY_SYMBOL)
                .map_err(|e| Error::theme(format!("{}: {e}", path.display())))?
        };

        // SAFETY: calling into the module's exported function; it must
        // return a pointer to a `'static` table, which is the documented
        // contract for `ply_theme_get_vtable` implementors.
        let vtable = unsafe { get_vtable() };
        if vtable.is_null() {
            return Err(Error::theme(format!("{}: returned a null vtable", path.display())));
        }

        // SAFETY: vtable is non-null per the check above; `create` is a
        // valid function pointer per the ABI contract.
        let handle = unsafe { ((*vtable).create)() };
        if handle.is_null() {
            return Err(Error::theme(format!("{}: create() returned null", path.display())));
        }

        Ok(Self {
            _library: library,
            vtable,
            handle,
        })
    }

    fn vt(&self) -> &PluginVTable {
        // SAFETY: `vtable` was checked non-null at construction and points
        // at a `'static` table owned by the still-loaded library.
        unsafe { &*self.vtable }
    }
}

impl Drop for DynamicTheme {
    fn drop(&mut self) {
        // SAFETY: `handle` was returned by this same vtable's `create`
        // and hasn't been freed yet; `destroy` is the module's documented
        // teardown entry point.
        unsafe { (self.vt().destroy)(self.handle) };
    }
}

fn to_cstring(s: &str) -> CString {
    CString::new(s.replace('\0', "")).unwrap_or_default()
}

impl ThemePlugin for DynamicTheme {
    fn attach_to_seat(&mut self, _seat: &mut Seat) {
        // Dynamic plugins draw through their own renderer binding done at
        // `create` time; no seat state crosses the FFI boundary.
    }

    fn detach_from_seat(&mut self, _seat: &mut Seat) {}

    fn show(&mut self, mode: Mode) -> bool {
        let mode = match mode {
            Mode::BootUp => 0,
            Mode::Shutdown => 1,
            Mode::Updates => 2,
        };
        // SAFETY: `handle` is live for the lifetime of `self`.
        unsafe { (self.vt().show)(self.handle, mode) }
    }

    fn hide(&mut self) {
        // SAFETY: `handle` is live for the lifetime of `self`.
        unsafe { (self.vt().hide)(self.handle) };
    }

    fn update_status(&mut self, status: &str) {
        let status = to_cstring(status);
        // SAFETY: `status` outlives the call; `handle` is live.
        unsafe { (self.vt().update_status)(self.handle, status.as_ptr()) };
    }

    fn on_boot_progress(&mut self, elapsed_seconds: f64, fraction_done: f64) {
        // SAFETY: `handle` is live for the lifetime of `self`.
        unsafe { (self.vt().on_boot_progress)(self.handle, elapsed_seconds, fraction_done) };
    }

    fn display_normal(&mut self) {
        // SAFETY: `handle` is live for the lifetime of `self`.
        unsafe { (self.vt().display_normal)(self.handle) };
    }

    fn display_message(&mut self, message: &str) {
        let message = to_cstring(message);
        // SAFETY: `message` outlives the call; `handle` is live.
        unsafe { (self.vt().display_message)(self.handle, message.as_ptr()) };
    }

    fn display_password(&mut self, prompt: &str, n_bullets: usize) {
        let prompt = to_cstring(prompt);
        // SAFETY: `prompt` outlives the call; `handle` is live.
        unsafe { (self.vt().display_password)(self.handle, prompt.as_ptr(), n_bullets) };
    }

    fn display_question(&mut self, prompt: &str, entry_text: &str) {
        let prompt = to_cstring(prompt);
        let entry_text = to_cstring(entry_text);
        // SAFETY: both strings outlive the call; `handle` is live.
        unsafe { (self.vt().display_question)(self.handle, prompt.as_ptr(), entry_text.as_ptr()) };
    }
}
