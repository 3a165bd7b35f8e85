//! Human-readable certificate rendering.

use crate::domain::{Certificate, CertificateStatus};

/// Renders a certificate for display. Seam for alternative formats
/// (PDF, HTML) without touching the handlers.
pub trait CertificateRenderer: Send + Sync {
    fn render(&self, certificate: &Certificate) -> String;
}

/// Plain-text renderer.
pub struct TextRenderer;

impl CertificateRenderer for TextRenderer {
    fn render(&self, certificate: &Certificate) -> String {
        let mut out = String::new();
        out.push_str("CERTIFICATE OF COMPLETION\n");
        out.push_str("=========================\n\n");
        out.push_str(&format!(
            "Awarded to:        {}\n",
            certificate.attributes.subject_name
        ));
        out.push_str(&format!(
            "Program:           {}\n",
            certificate.attributes.program
        ));
        out.push_str(&format!(
            "Credential value:  {}\n",
            certificate.attributes.credential_value
        ));
        out.push_str(&format!(
            "Issuing authority: {}\n",
            certificate.attributes.issuing_authority
        ));
        out.push_str(&format!("Version:           {}\n", certificate.version));
        out.push_str(&format!(
            "Issued:            {}\n",
            certificate.issuance_time.format("%Y-%m-%d %H:%M:%S UTC")
        ));
        out.push_str(&format!("Hash:              {}\n", certificate.cert_hash));
        match certificate.status() {
            CertificateStatus::Active => out.push_str("Status:            ACTIVE\n"),
            CertificateStatus::Revoked => {
                out.push_str("Status:            REVOKED\n");
                if let Some(reason) = &certificate.revocation_reason {
                    out.push_str(&format!("Reason:            {reason}\n"));
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Address, CertificateAttributes, CredentialValue};
    use chrono::Utc;

    fn cert() -> Certificate {
        Certificate::new(
            "S1",
            1,
            CertificateAttributes {
                subject_name: "Ada Lovelace".to_string(),
                program: "Mathematics".to_string(),
                credential_value: CredentialValue::from_scaled(385),
                issuing_authority: "Analytical Engine Institute".to_string(),
            },
            Address::from_public_key_bytes(&[1u8; 32]),
            Utc::now(),
        )
    }

    #[test]
    fn renders_active_certificate() {
        let text = TextRenderer.render(&cert());
        assert!(text.contains("Ada Lovelace"));
        assert!(text.contains("3.85"));
        assert!(text.contains("Status:            ACTIVE"));
        assert!(!text.contains("Reason"));
    }

    #[test]
    fn renders_revocation_reason() {
        let mut cert = cert();
        cert.is_revoked = true;
        cert.revocation_reason = Some("issued in error".to_string());
        let text = TextRenderer.render(&cert);
        assert!(text.contains("REVOKED"));
        assert!(text.contains("issued in error"));
    }
}
