//! Owned handles over the CoreFoundation/Security objects used for trust
//! evaluation.
//!
//! Every "Create"/"Copy" result is wrapped in an [`Owned`] handle and released
//! exactly once when the handle drops. "Get" results are borrowed and never
//! wrapped. Raw pointers do not leave this module except through
//! [`SecurityApi`], which is the only place native code is entered.

use crate::error::Error;
use std::ffi::c_void;
use std::fmt;
use std::marker::PhantomData;
use std::ptr::{self, NonNull};

pub type CFTypeRef = *const c_void;
pub type CFIndex = isize;
pub type OSStatus = i32;

pub const ERR_SEC_SUCCESS: OSStatus = 0;

/// Raw entry points into CoreFoundation and Security.
///
/// # Safety
///
/// Every `CFTypeRef` argument must be null where the underlying call accepts
/// null, or a live reference produced by the same implementation. Results
/// follow the native ownership rules: `*_create*` and `*_copy*` return an
/// owned (+1) reference, everything else is borrowed.
pub trait SecurityApi: Send + Sync {
    /// `CFDataCreate`
    unsafe fn data_create(&self, bytes: &[u8]) -> CFTypeRef;
    /// `CFStringCreateWithBytes`, UTF-8
    unsafe fn string_create(&self, value: &str) -> CFTypeRef;
    /// Copies a CFString out as UTF-8.
    unsafe fn string_to_owned(&self, string: CFTypeRef) -> Option<String>;
    /// `CFArrayCreateMutable` with `kCFTypeArrayCallBacks`
    unsafe fn array_create_mutable(&self) -> CFTypeRef;
    /// `CFArrayAppendValue`; the array retains `value`.
    unsafe fn array_append_value(&self, array: CFTypeRef, value: CFTypeRef);
    /// `SecCertificateCreateWithData`; null for undecodable DER.
    unsafe fn certificate_create_with_data(&self, data: CFTypeRef) -> CFTypeRef;
    /// `SecPolicyCreateSSL`
    unsafe fn policy_create_ssl(&self, server: bool, hostname: CFTypeRef) -> CFTypeRef;
    /// `SecTrustCreateWithCertificates`
    unsafe fn trust_create_with_certificates(
        &self,
        certificates: CFTypeRef,
        policies: CFTypeRef,
        trust: *mut CFTypeRef,
    ) -> OSStatus;
    /// `SecTrustSetAnchorCertificates`; null restores the system anchors.
    unsafe fn trust_set_anchor_certificates(&self, trust: CFTypeRef, anchors: CFTypeRef)
        -> OSStatus;
    /// `SecTrustEvaluateWithError`, returned as the raw byte so values other
    /// than 0 and 1 can be told apart.
    unsafe fn trust_evaluate_with_error(&self, trust: CFTypeRef, error: *mut CFTypeRef) -> u8;
    /// `CFErrorGetCode`
    unsafe fn error_get_code(&self, error: CFTypeRef) -> CFIndex;
    /// `CFErrorCopyDescription`
    unsafe fn error_copy_description(&self, error: CFTypeRef) -> CFTypeRef;
    /// `SecCopyErrorMessageString`
    unsafe fn copy_error_message_string(&self, status: OSStatus) -> CFTypeRef;
    /// `CFRelease`
    unsafe fn release(&self, cf: CFTypeRef);
}

pub trait Kind {
    const NAME: &'static str;
}

macro_rules! kinds {
    ($($name:ident),* $(,)?) => {
        $(
            pub enum $name {}

            impl Kind for $name {
                const NAME: &'static str = stringify!($name);
            }
        )*
    };
}

kinds!(CFData, CFString, CFMutableArray, CFError, SecCertificate, SecPolicy, SecTrust);

/// A single owned (+1) reference to a native object of kind `K`.
///
/// Not `Clone`: a handle can be released only by dropping it, and only once.
pub struct Owned<'a, A: SecurityApi, K: Kind> {
    api: &'a A,
    raw: NonNull<c_void>,
    _kind: PhantomData<K>,
}

impl<'a, A: SecurityApi, K: Kind> Owned<'a, A, K> {
    /// # Safety
    ///
    /// `raw` must be null or a reference the caller owns under the Create rule.
    unsafe fn from_create_rule(api: &'a A, raw: CFTypeRef) -> Option<Self> {
        NonNull::new(raw as *mut c_void).map(|raw| Owned {
            api,
            raw,
            _kind: PhantomData,
        })
    }

    /// # Safety
    ///
    /// As [`Owned::from_create_rule`]; null becomes [`Error::Allocation`].
    unsafe fn created(api: &'a A, raw: CFTypeRef) -> Result<Self, Error> {
        Self::from_create_rule(api, raw).ok_or(Error::Allocation(K::NAME))
    }

    fn as_raw(&self) -> CFTypeRef {
        self.raw.as_ptr() as CFTypeRef
    }
}

impl<'a, A: SecurityApi, K: Kind> Drop for Owned<'a, A, K> {
    fn drop(&mut self) {
        // SAFETY: `raw` is a live +1 reference and this is its only release.
        unsafe { self.api.release(self.as_raw()) }
    }
}

impl<'a, A: SecurityApi, K: Kind> fmt::Debug for Owned<'a, A, K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({:p})", K::NAME, self.raw)
    }
}

impl<'a, A: SecurityApi> Owned<'a, A, CFData> {
    pub fn from_bytes(api: &'a A, bytes: &[u8]) -> Result<Self, Error> {
        unsafe { Self::created(api, api.data_create(bytes)) }
    }
}

impl<'a, A: SecurityApi> Owned<'a, A, CFString> {
    pub fn new(api: &'a A, value: &str) -> Result<Self, Error> {
        unsafe { Self::created(api, api.string_create(value)) }
    }

    pub fn contents(&self) -> Option<String> {
        unsafe { self.api.string_to_owned(self.as_raw()) }
    }
}

impl<'a, A: SecurityApi> Owned<'a, A, CFMutableArray> {
    pub fn new(api: &'a A) -> Result<Self, Error> {
        unsafe { Self::created(api, api.array_create_mutable()) }
    }

    /// Appends `value`; the array takes its own reference, the caller keeps theirs.
    pub fn push<K: Kind>(&mut self, value: &Owned<'a, A, K>) {
        unsafe { self.api.array_append_value(self.as_raw(), value.as_raw()) }
    }
}

impl<'a, A: SecurityApi> Owned<'a, A, SecCertificate> {
    /// `None` when the DER could not be decoded.
    pub fn from_der_data(api: &'a A, data: &Owned<'a, A, CFData>) -> Option<Self> {
        unsafe { Self::from_create_rule(api, api.certificate_create_with_data(data.as_raw())) }
    }
}

impl<'a, A: SecurityApi> Owned<'a, A, SecPolicy> {
    /// Policy for authenticating a TLS server, optionally bound to a host name.
    pub fn ssl_server(api: &'a A, hostname: Option<&Owned<'a, A, CFString>>) -> Result<Self, Error> {
        let hostname = hostname.map_or(ptr::null(), |h| h.as_raw());
        unsafe { Self::created(api, api.policy_create_ssl(true, hostname)) }
    }
}

/// Result of `SecTrustEvaluateWithError`.
pub enum Evaluation<'a, A: SecurityApi> {
    Trusted,
    Untrusted(Option<Owned<'a, A, CFError>>),
}

impl<'a, A: SecurityApi> Owned<'a, A, SecTrust> {
    pub fn with_certificates(
        api: &'a A,
        certificates: &Owned<'a, A, CFMutableArray>,
        policy: &Owned<'a, A, SecPolicy>,
    ) -> Result<Self, Error> {
        let mut trust: CFTypeRef = ptr::null();
        let status = unsafe {
            api.trust_create_with_certificates(certificates.as_raw(), policy.as_raw(), &mut trust)
        };
        // Take ownership before checking the status so a stray object is still released.
        let trust = unsafe { Self::from_create_rule(api, trust) };
        check_status(api, status, "SecTrustCreateWithCertificates")?;
        trust.ok_or(Error::Allocation(SecTrust::NAME))
    }

    /// Limits the anchors to the system defaults.
    pub fn use_system_anchors(&self) -> Result<(), Error> {
        let status = unsafe {
            self.api
                .trust_set_anchor_certificates(self.as_raw(), ptr::null())
        };
        check_status(self.api, status, "SecTrustSetAnchorCertificates")
    }

    pub fn evaluate(&self) -> Result<Evaluation<'a, A>, Error> {
        let mut error: CFTypeRef = ptr::null();
        let result = unsafe { self.api.trust_evaluate_with_error(self.as_raw(), &mut error) };
        let error = unsafe { Owned::<A, CFError>::from_create_rule(self.api, error) };
        match result {
            1 => Ok(Evaluation::Trusted),
            0 => Ok(Evaluation::Untrusted(error)),
            other => Err(Error::InternalEvaluation(format!(
                "unknown result from SecTrustEvaluateWithError: {}",
                other
            ))),
        }
    }
}

impl<'a, A: SecurityApi> Owned<'a, A, CFError> {
    pub fn code(&self) -> CFIndex {
        unsafe { self.api.error_get_code(self.as_raw()) }
    }

    pub fn description(&self) -> Option<String> {
        let description = unsafe {
            Owned::<A, CFString>::from_create_rule(
                self.api,
                self.api.error_copy_description(self.as_raw()),
            )
        };
        description.and_then(|d| d.contents())
    }
}

fn check_status<A: SecurityApi>(api: &A, status: OSStatus, call: &str) -> Result<(), Error> {
    if status == ERR_SEC_SUCCESS {
        return Ok(());
    }
    let message = unsafe {
        Owned::<A, CFString>::from_create_rule(api, api.copy_error_message_string(status))
    }
    .and_then(|m| m.contents());
    Err(Error::InternalEvaluation(match message {
        Some(message) => format!("{} failed: {} ({})", call, message, status),
        None => format!("{} failed with status {}", call, status),
    }))
}
