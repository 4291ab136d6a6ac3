//! Vérification du mot de passe d'administration (upload, suppression)

/// Compare un mot de passe candidat au secret configuré
#[derive(Debug, Clone)]
pub struct PasswordVerifier {
    secret: String,
}

impl PasswordVerifier {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    /// Secret lu dans `host.security.password`
    pub fn from_config() -> Self {
        Self::new(tuneconfig::get_config().get_password())
    }

    /// Un secret vide n'accepte aucun mot de passe
    pub fn check(&self, candidate: &str) -> bool {
        !self.secret.is_empty() && candidate == self.secret
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equality_only() {
        let verifier = PasswordVerifier::new("s3cret");
        assert!(verifier.check("s3cret"));
        assert!(!verifier.check("S3cret"));
        assert!(!verifier.check(""));

        assert!(!PasswordVerifier::new("").check(""));
    }
}
