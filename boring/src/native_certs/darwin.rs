//! CoreFoundation.framework and Security.framework, as linked through
//! `core-foundation-sys` and `security-framework-sys`.

use super::cf::{CFIndex, CFTypeRef, OSStatus, SecurityApi};
use core_foundation::base::TCFType;
use core_foundation::string::CFString;
use core_foundation_sys::array::{kCFTypeArrayCallBacks, CFArrayAppendValue, CFArrayCreateMutable};
use core_foundation_sys::base::{Boolean, CFRelease};
use core_foundation_sys::data::CFDataCreate;
use core_foundation_sys::error::{CFErrorCopyDescription, CFErrorGetCode, CFErrorRef};
use core_foundation_sys::string::{kCFStringEncodingUTF8, CFStringCreateWithBytes, CFStringRef};
use security_framework_sys::base::{SecCopyErrorMessageString, SecTrustRef};
use security_framework_sys::certificate::SecCertificateCreateWithData;
use security_framework_sys::policy::SecPolicyCreateSSL;
use security_framework_sys::trust::{
    SecTrustCreateWithCertificates, SecTrustEvaluateWithError, SecTrustSetAnchorCertificates,
};
use std::ptr;

/// The linked system frameworks.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemSecurity;

impl SecurityApi for SystemSecurity {
    unsafe fn data_create(&self, bytes: &[u8]) -> CFTypeRef {
        CFDataCreate(ptr::null(), bytes.as_ptr(), bytes.len() as CFIndex) as CFTypeRef
    }

    unsafe fn string_create(&self, value: &str) -> CFTypeRef {
        CFStringCreateWithBytes(
            ptr::null(),
            value.as_ptr(),
            value.len() as CFIndex,
            kCFStringEncodingUTF8,
            false as Boolean,
        ) as CFTypeRef
    }

    unsafe fn string_to_owned(&self, string: CFTypeRef) -> Option<String> {
        if string.is_null() {
            return None;
        }
        // get rule: the wrapper takes its own reference and drops it again
        Some(CFString::wrap_under_get_rule(string as CFStringRef).to_string())
    }

    unsafe fn array_create_mutable(&self) -> CFTypeRef {
        CFArrayCreateMutable(ptr::null(), 0, &kCFTypeArrayCallBacks) as CFTypeRef
    }

    unsafe fn array_append_value(&self, array: CFTypeRef, value: CFTypeRef) {
        CFArrayAppendValue(array as _, value)
    }

    unsafe fn certificate_create_with_data(&self, data: CFTypeRef) -> CFTypeRef {
        SecCertificateCreateWithData(ptr::null(), data as _) as CFTypeRef
    }

    unsafe fn policy_create_ssl(&self, server: bool, hostname: CFTypeRef) -> CFTypeRef {
        SecPolicyCreateSSL(server as Boolean, hostname as CFStringRef) as CFTypeRef
    }

    unsafe fn trust_create_with_certificates(
        &self,
        certificates: CFTypeRef,
        policies: CFTypeRef,
        trust: *mut CFTypeRef,
    ) -> OSStatus {
        let mut created: SecTrustRef = ptr::null_mut();
        let status = SecTrustCreateWithCertificates(certificates, policies, &mut created);
        *trust = created as CFTypeRef;
        status
    }

    unsafe fn trust_set_anchor_certificates(
        &self,
        trust: CFTypeRef,
        anchors: CFTypeRef,
    ) -> OSStatus {
        SecTrustSetAnchorCertificates(trust as SecTrustRef, anchors as _)
    }

    unsafe fn trust_evaluate_with_error(&self, trust: CFTypeRef, error: *mut CFTypeRef) -> u8 {
        let mut raw: CFErrorRef = ptr::null_mut();
        let trusted = SecTrustEvaluateWithError(trust as SecTrustRef, &mut raw);
        *error = raw as CFTypeRef;
        u8::from(trusted)
    }

    unsafe fn error_get_code(&self, error: CFTypeRef) -> CFIndex {
        CFErrorGetCode(error as CFErrorRef)
    }

    unsafe fn error_copy_description(&self, error: CFTypeRef) -> CFTypeRef {
        CFErrorCopyDescription(error as CFErrorRef) as CFTypeRef
    }

    unsafe fn copy_error_message_string(&self, status: OSStatus) -> CFTypeRef {
        SecCopyErrorMessageString(status, ptr::null_mut()) as CFTypeRef
    }

    unsafe fn release(&self, cf: CFTypeRef) {
        CFRelease(cf)
    }
}
