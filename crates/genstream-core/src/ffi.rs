//! C ABI for embedding sessions in non-Rust hosts.
//!
//! Engines and sessions cross the boundary as opaque handles. Rust code that
//! built an [`Engine`] or [`Session`] hands them out with `into_raw`; the host
//! destroys them with [`llm_engine_delete`] and [`llm_session_delete`].
//! Generated text crosses as an [`LlmResponseContext`], which the host must
//! release exactly once with [`llm_response_context_close`].
//!
//! Every `unsafe extern "C"` function expects pointers produced by this module
//! (or null where documented) and C strings that are NUL-terminated.

use crate::{engine::Engine, response::ResponseContext, session::Session, CoreError};
use std::ffi::{c_char, c_int, c_void, CStr, CString};
use std::ptr;
use tracing::error;

/// Generated text handed to the host
#[repr(C)]
#[derive(Debug)]
pub struct LlmResponseContext {
    /// Array of `response_count` NUL-terminated strings
    pub response_array: *mut *mut c_char,
    pub response_count: usize,
    /// Whether this is the final response of its request
    pub done: bool,
}

/// Model settings accepted by [`llm_create_engine`]
#[repr(C)]
#[derive(Debug)]
pub struct LlmModelSettings {
    pub model_path: *const c_char,
    pub cache_dir: *const c_char,
    pub max_num_tokens: usize,
}

/// Session settings accepted by [`llm_create_session`]
#[repr(C)]
#[derive(Debug)]
pub struct LlmSessionConfig {
    pub topk: usize,
    pub temperature: f32,
    pub random_seed: usize,
}

/// Opaque engine handle
pub struct LlmEngineHandle(Engine);

/// Opaque session handle
pub struct LlmSessionHandle(Session);

/// Callback invoked on the session thread with an owned response, which the
/// host releases with [`llm_response_context_free`].
pub type LlmResponseCallback =
    unsafe extern "C" fn(callback_context: *mut c_void, response_context: *mut LlmResponseContext);

impl Engine {
    /// Move this engine handle across the C ABI
    pub fn into_raw(self) -> *mut LlmEngineHandle {
        Box::into_raw(Box::new(LlmEngineHandle(self)))
    }
}

impl Session {
    /// Move this session across the C ABI
    pub fn into_raw(self) -> *mut LlmSessionHandle {
        Box::into_raw(Box::new(LlmSessionHandle(self)))
    }
}

impl LlmResponseContext {
    fn empty(done: bool) -> Self {
        Self {
            response_array: ptr::null_mut(),
            response_count: 0,
            done,
        }
    }
}

impl From<ResponseContext> for LlmResponseContext {
    fn from(response: ResponseContext) -> Self {
        let done = response.is_done();
        let buffers: Box<[*mut c_char]> = response
            .into_responses()
            .into_iter()
            .map(|text| to_c_string(text).into_raw())
            .collect();
        let response_count = buffers.len();
        Self {
            response_array: Box::into_raw(buffers).cast::<*mut c_char>(),
            response_count,
            done,
        }
    }
}

/// C strings end at the first NUL; anything after it is dropped
fn to_c_string(text: String) -> CString {
    match CString::new(text) {
        Ok(c) => c,
        Err(e) => {
            let nul = e.nul_position();
            let mut bytes = e.into_vec();
            bytes.truncate(nul);
            CString::new(bytes).unwrap_or_default()
        }
    }
}

unsafe fn read_input(input: *const c_char) -> String {
    if input.is_null() {
        String::new()
    } else {
        CStr::from_ptr(input).to_string_lossy().into_owned()
    }
}

unsafe fn write_error(error_msg: *mut *mut c_char, message: &str) {
    if !error_msg.is_null() {
        *error_msg = to_c_string(message.to_string()).into_raw();
    }
}

/// Report an entry point without an implementation on this build
unsafe fn not_implemented(entry_point: &str, error_msg: *mut *mut c_char) -> c_int {
    let err = CoreError::not_implemented("NOT_IMPLEMENTED", "Not implemented", entry_point);
    if let CoreError::NotImplemented { message, .. } = &err {
        write_error(error_msg, message);
    }
    err.status_code()
}

/// Send wrapper for the host's callback and its opaque context
struct HostCallback {
    context: *mut c_void,
    callback: LlmResponseCallback,
}

// The host guarantees the context may be used from the session thread.
unsafe impl Send for HostCallback {}

impl HostCallback {
    fn deliver(&self, response: ResponseContext) {
        let response = Box::into_raw(Box::new(LlmResponseContext::from(response)));
        unsafe { (self.callback)(self.context, response) }
    }
}

/// Release every buffer and the array of `response_context`. Closing an
/// already closed context does nothing.
#[no_mangle]
pub unsafe extern "C" fn llm_response_context_close(response_context: *mut LlmResponseContext) {
    let Some(ctx) = response_context.as_mut() else {
        return;
    };
    if !ctx.response_array.is_null() {
        let buffers = Box::from_raw(ptr::slice_from_raw_parts_mut(
            ctx.response_array,
            ctx.response_count,
        ));
        for &buffer in buffers.iter() {
            if !buffer.is_null() {
                drop(CString::from_raw(buffer));
            }
        }
    }
    ctx.response_array = ptr::null_mut();
    ctx.response_count = 0;
}

/// Close and free a context delivered to an [`LlmResponseCallback`]
#[no_mangle]
pub unsafe extern "C" fn llm_response_context_free(response_context: *mut LlmResponseContext) {
    if response_context.is_null() {
        return;
    }
    llm_response_context_close(response_context);
    drop(Box::from_raw(response_context));
}

/// Engine creation from model settings is not available through the C ABI.
#[no_mangle]
pub unsafe extern "C" fn llm_create_engine(
    _model_settings: *const LlmModelSettings,
    engine_out: *mut *mut LlmEngineHandle,
    error_msg: *mut *mut c_char,
) -> c_int {
    if !engine_out.is_null() {
        *engine_out = ptr::null_mut();
    }
    not_implemented("llm_create_engine", error_msg)
}

/// Destroy an engine handle. Sessions created from it stay valid.
#[no_mangle]
pub unsafe extern "C" fn llm_engine_delete(engine: *mut LlmEngineHandle) {
    if !engine.is_null() {
        drop(Box::from_raw(engine));
    }
}

/// Session creation with sampling settings is not available through the C ABI.
#[no_mangle]
pub unsafe extern "C" fn llm_create_session(
    _engine: *mut LlmEngineHandle,
    _session_config: *const LlmSessionConfig,
    session_out: *mut *mut LlmSessionHandle,
    error_msg: *mut *mut c_char,
) -> c_int {
    if !session_out.is_null() {
        *session_out = ptr::null_mut();
    }
    not_implemented("llm_create_session", error_msg)
}

/// Destroy a session, blocking until its running request has finished
#[no_mangle]
pub unsafe extern "C" fn llm_session_delete(session: *mut LlmSessionHandle) {
    if !session.is_null() {
        drop(Box::from_raw(session));
    }
}

/// Generate a complete response. On failure the context is empty and done.
#[no_mangle]
pub unsafe extern "C" fn llm_session_predict_sync(
    session: *mut LlmSessionHandle,
    input: *const c_char,
) -> LlmResponseContext {
    let Some(handle) = session.as_mut() else {
        return LlmResponseContext::empty(true);
    };
    match handle.0.predict_sync(read_input(input)) {
        Ok(response) => response.into(),
        Err(e) => {
            error!("llm_session_predict_sync failed: {}", e);
            LlmResponseContext::empty(true)
        }
    }
}

/// Start a streaming request; `callback` runs on the session thread
#[no_mangle]
pub unsafe extern "C" fn llm_session_predict_async(
    session: *mut LlmSessionHandle,
    callback_context: *mut c_void,
    input: *const c_char,
    callback: LlmResponseCallback,
) {
    let Some(handle) = session.as_mut() else {
        return;
    };
    let host = HostCallback {
        context: callback_context,
        callback,
    };
    let result = handle
        .0
        .predict_async(read_input(input), move |response| host.deliver(response));
    if let Err(e) = result {
        error!("llm_session_predict_async failed: {}", e);
        HostCallback {
            context: callback_context,
            callback,
        }
        .deliver(ResponseContext::chunk(String::new(), true));
    }
}

/// Number of tokens `input` encodes to, or -1 with `error_msg` set
#[no_mangle]
pub unsafe extern "C" fn llm_session_size_in_tokens(
    session: *mut LlmSessionHandle,
    input: *const c_char,
    error_msg: *mut *mut c_char,
) -> c_int {
    let Some(handle) = session.as_ref() else {
        write_error(error_msg, "Session handle is null");
        return -1;
    };
    match handle.0.size_in_tokens(&read_input(input)) {
        Ok(count) => c_int::try_from(count).unwrap_or(c_int::MAX),
        Err(e) => {
            write_error(error_msg, &e.to_string());
            -1
        }
    }
}

/// Free an error message written by this module
#[no_mangle]
pub unsafe extern "C" fn llm_free_error_message(error_msg: *mut c_char) {
    if !error_msg.is_null() {
        drop(CString::from_raw(error_msg));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        model::replay::ReplayModel,
        tokenizer::vocab::{VocabTokenizer, VocabularyBuilder},
    };
    use parking_lot::Mutex;

    fn engine() -> Engine {
        let vocab = VocabularyBuilder::new()
            .set_bos_token("<s>")
            .add_tokens(('a'..='z').map(|c| c.to_string()))
            .build();
        let tokenizer = VocabTokenizer::new(vocab).with_dummy_prefix(false);
        let model = ReplayModel::from_text(&tokenizer, "hello").unwrap();
        Engine::builder()
            .tokenizer(tokenizer)
            .model(model)
            .start_token_id(0)
            .max_num_tokens(6)
            .build()
            .unwrap()
    }

    unsafe fn texts(ctx: &LlmResponseContext) -> Vec<String> {
        (0..ctx.response_count)
            .map(|i| {
                CStr::from_ptr(*ctx.response_array.add(i))
                    .to_string_lossy()
                    .into_owned()
            })
            .collect()
    }

    #[test]
    fn test_create_entry_points_not_implemented() {
        unsafe {
            let mut engine_out = ptr::NonNull::<LlmEngineHandle>::dangling().as_ptr();
            let mut error: *mut c_char = ptr::null_mut();
            let code = llm_create_engine(ptr::null(), &mut engine_out, &mut error);
            assert_eq!(code, 12);
            assert!(engine_out.is_null());
            assert_eq!(CStr::from_ptr(error).to_str().unwrap(), "Not implemented");
            llm_free_error_message(error);

            let mut session_out = ptr::null_mut();
            let mut error: *mut c_char = ptr::null_mut();
            let code = llm_create_session(ptr::null_mut(), ptr::null(), &mut session_out, &mut error);
            assert_eq!(code, 12);
            assert!(session_out.is_null());
            assert_eq!(CStr::from_ptr(error).to_str().unwrap(), "Not implemented");
            llm_free_error_message(error);

            // both entry points report the same status, with or without a message slot
            let engine_code = llm_create_engine(ptr::null(), ptr::null_mut(), ptr::null_mut());
            let session_code =
                llm_create_session(ptr::null_mut(), ptr::null(), ptr::null_mut(), ptr::null_mut());
            assert_eq!(engine_code, crate::status::UNIMPLEMENTED);
            assert_eq!(session_code, engine_code);
        }
    }

    #[test]
    fn test_predict_sync_and_idempotent_close() {
        let engine = engine();
        let session = engine.create_session().into_raw();
        let engine = engine.into_raw();
        let input = CString::new("").unwrap();

        unsafe {
            let mut ctx = llm_session_predict_sync(session, input.as_ptr());
            assert!(ctx.done);
            assert_eq!(texts(&ctx), vec!["hello".to_string()]);

            llm_response_context_close(&mut ctx);
            assert!(ctx.response_array.is_null());
            assert_eq!(ctx.response_count, 0);
            llm_response_context_close(&mut ctx);

            llm_engine_delete(engine);
            llm_session_delete(session);
        }
    }

    unsafe extern "C" fn collect(context: *mut c_void, response: *mut LlmResponseContext) {
        let sink = &*(context as *const Mutex<Vec<(Vec<String>, bool)>>);
        sink.lock().push((texts(&*response), (*response).done));
        llm_response_context_free(response);
    }

    #[test]
    fn test_predict_async_delivers_owned_contexts() {
        let sink: Mutex<Vec<(Vec<String>, bool)>> = Mutex::new(Vec::new());
        let session = engine().create_session().into_raw();
        let input = CString::new("").unwrap();

        unsafe {
            llm_session_predict_async(
                session,
                &sink as *const _ as *mut c_void,
                input.as_ptr(),
                collect,
            );
            llm_session_delete(session);
        }

        let received = sink.into_inner();
        assert_eq!(received.len(), 5);
        assert!(received.last().unwrap().1);
        let text: String = received.iter().flat_map(|(t, _)| t.iter().cloned()).collect();
        assert_eq!(text, "hello");
    }

    #[test]
    fn test_size_in_tokens_reports_errors() {
        let session = engine().create_session().into_raw();
        let good = CString::new("abc").unwrap();
        let bad = CString::new("ABC").unwrap();

        unsafe {
            let mut error: *mut c_char = ptr::null_mut();
            assert_eq!(llm_session_size_in_tokens(session, good.as_ptr(), &mut error), 3);
            assert!(error.is_null());

            assert_eq!(llm_session_size_in_tokens(session, bad.as_ptr(), &mut error), -1);
            assert!(!error.is_null());
            assert!(CStr::from_ptr(error)
                .to_str()
                .unwrap()
                .contains("TOKENIZER_UNKNOWN_CHARACTER"));
            llm_free_error_message(error);
            llm_session_delete(session);
        }
    }

    #[test]
    fn test_interior_nul_truncates() {
        let mut ctx = LlmResponseContext::from(ResponseContext::chunk("ab\0cd".to_string(), false));
        unsafe {
            assert_eq!(texts(&ctx), vec!["ab".to_string()]);
            llm_response_context_close(&mut ctx);
        }
    }
}
