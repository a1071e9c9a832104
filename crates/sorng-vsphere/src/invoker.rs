//! Remote invoker: named operation + target reference + ordered arguments in,
//! decoded value out.

use crate::error::{VsphereError, VsphereResult};
use crate::soap;
use crate::transport::SoapTransport;
use crate::types::{ManagedObjectReference, VimValue};

use async_trait::async_trait;
use log::debug;
use tokio_util::sync::CancellationToken;

/// Ordered named arguments. Order is preserved on the wire.
pub type Args = Vec<(String, VimValue)>;

/// Build one named argument.
pub fn arg(name: &str, value: impl Into<VimValue>) -> (String, VimValue) {
    (name.to_string(), value.into())
}

#[async_trait]
pub trait Invoker: Send + Sync {
    /// Invoke `operation` on `this`. No retries at this layer.
    async fn invoke(
        &self,
        operation: &str,
        this: &ManagedObjectReference,
        args: &[(String, VimValue)],
    ) -> VsphereResult<VimValue>;

    /// Same as [`Invoker::invoke`], abandoned with `Cancelled` as soon as
    /// `cancel` fires. The server may still complete the operation.
    async fn invoke_with_cancel(
        &self,
        operation: &str,
        this: &ManagedObjectReference,
        args: &[(String, VimValue)],
        cancel: &CancellationToken,
    ) -> VsphereResult<VimValue> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(VsphereError::cancelled(format!("{operation} on {this} cancelled"))),
            result = self.invoke(operation, this, args) => result,
        }
    }
}

/// Invoker speaking VIM25 SOAP over any [`SoapTransport`]. Operation
/// names are sent unchecked; a name the server does not define comes back
/// as a `MethodNotFound` fault and fails with `UnknownOperation`.
pub struct SoapInvoker<T: SoapTransport> {
    transport: T,
}

impl<T: SoapTransport> SoapInvoker<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }
}

#[async_trait]
impl<T: SoapTransport> Invoker for SoapInvoker<T> {
    async fn invoke(
        &self,
        operation: &str,
        this: &ManagedObjectReference,
        args: &[(String, VimValue)],
    ) -> VsphereResult<VimValue> {
        debug!("invoke {operation} on {this} ({} argument(s))", args.len());

        let envelope = soap::build_envelope(operation, this, args);
        let body = self.transport.send(&envelope).await?;
        soap::parse_response(&body, operation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::VsphereErrorKind;
    use std::sync::Mutex;
    use std::time::Duration;

    struct CannedTransport {
        reply: String,
        delay: Duration,
        sent: Mutex<Vec<String>>,
    }

    impl CannedTransport {
        fn new(reply: &str) -> Self {
            Self {
                reply: reply.to_string(),
                delay: Duration::ZERO,
                sent: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl SoapTransport for CannedTransport {
        async fn send(&self, envelope: &str) -> VsphereResult<String> {
            self.sent.lock().unwrap().push(envelope.to_string());
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            Ok(self.reply.clone())
        }
    }

    const CURRENT_TIME_REPLY: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<soapenv:Envelope xmlns:soapenv="http://schemas.xmlsoap.org/soap/envelope/" xmlns:xsd="http://www.w3.org/2001/XMLSchema" xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance">
<soapenv:Body><CurrentTimeResponse xmlns="urn:vim25"><returnval>2024-03-01T10:00:00.123Z</returnval></CurrentTimeResponse></soapenv:Body>
</soapenv:Envelope>"#;

    #[tokio::test]
    async fn sends_envelope_and_decodes_returnval() {
        let invoker = SoapInvoker::new(CannedTransport::new(CURRENT_TIME_REPLY));
        let value = invoker
            .invoke("CurrentTime", &ManagedObjectReference::service_instance(), &[])
            .await
            .unwrap();
        assert_eq!(value.as_str(), Some("2024-03-01T10:00:00.123Z"));

        let sent = invoker.transport().sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].contains("<CurrentTime xmlns=\"urn:vim25\">"));
    }

    const UNKNOWN_METHOD_REPLY: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<soapenv:Envelope xmlns:soapenv="http://schemas.xmlsoap.org/soap/envelope/" xmlns:xsd="http://www.w3.org/2001/XMLSchema" xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance">
<soapenv:Body><soapenv:Fault><faultcode>ClientFaultCode</faultcode><faultstring>Unable to resolve WSDL method name Frobnicate for namespace name urn:vim25</faultstring></soapenv:Fault></soapenv:Body>
</soapenv:Envelope>"#;

    const SUPPORTED_FEATURES_REPLY: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<soapenv:Envelope xmlns:soapenv="http://schemas.xmlsoap.org/soap/envelope/" xmlns:xsd="http://www.w3.org/2001/XMLSchema" xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance">
<soapenv:Body><QuerySupportedFeaturesResponse xmlns="urn:vim25">
<returnval><key>vmotion</key><featureName>vMotion</featureName><state>enabled</state></returnval>
</QuerySupportedFeaturesResponse></soapenv:Body>
</soapenv:Envelope>"#;

    #[tokio::test]
    async fn server_rejection_is_unknown_operation() {
        let invoker = SoapInvoker::new(CannedTransport::new(UNKNOWN_METHOD_REPLY));
        let err = invoker
            .invoke("Frobnicate", &ManagedObjectReference::service_instance(), &[])
            .await
            .unwrap_err();
        assert_eq!(err.kind, VsphereErrorKind::UnknownOperation);
        let sent = invoker.transport().sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].contains("<Frobnicate xmlns=\"urn:vim25\">"));
    }

    #[tokio::test]
    async fn any_operation_name_reaches_the_server() {
        let invoker = SoapInvoker::new(CannedTransport::new(SUPPORTED_FEATURES_REPLY));
        let licenses = ManagedObjectReference::new("LicenseManager", "LicenseManager");
        let value = invoker
            .invoke("QuerySupportedFeatures", &licenses, &[])
            .await
            .unwrap();
        assert_eq!(value.field("featureName").and_then(VimValue::as_str), Some("vMotion"));

        for op in ["PowerOnMultiVM_Task", "CreateVApp"] {
            let _ = invoker.invoke(op, &licenses, &[]).await;
        }
        let sent = invoker.transport().sent.lock().unwrap();
        assert_eq!(sent.len(), 3);
        assert!(sent[0].contains("<QuerySupportedFeatures xmlns=\"urn:vim25\">"));
        assert!(sent[2].contains("<CreateVApp xmlns=\"urn:vim25\">"));
    }

    #[tokio::test]
    async fn cancellation_wins_over_slow_call() {
        let mut transport = CannedTransport::new(CURRENT_TIME_REPLY);
        transport.delay = Duration::from_secs(30);
        let invoker = SoapInvoker::new(transport);

        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = invoker
            .invoke_with_cancel("CurrentTime", &ManagedObjectReference::service_instance(), &[], &cancel)
            .await
            .unwrap_err();
        assert_eq!(err.kind, VsphereErrorKind::Cancelled);
    }

    #[test]
    fn arg_helper_converts_values() {
        let (name, value) = arg("force", true);
        assert_eq!(name, "force");
        assert_eq!(value, VimValue::Bool(true));
    }
}
