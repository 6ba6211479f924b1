//! User-facing strings. The app speaks French; technical causes stay in the logs.

/// Shown as the answer when the service replied but produced no text
pub const FALLBACK_ANSWER: &str = "Désolé, je n'ai pas pu trouver les résultats.";

/// Shown for every analysis failure, whatever the underlying cause
pub const ANALYSIS_FAILED: &str = "Une erreur est survenue lors de l'analyse. Réessayez.";

/// Shown on the camera screen when the device cannot be opened or read
pub const CAMERA_FAILED: &str = "Impossible d'accéder à la caméra. Vérifiez les permissions.";

/// Shown on the error screen if no message was recorded
pub const UNKNOWN_ERROR: &str = "Une erreur inconnue s'est produite.";

/// Reminder printed under every answer
pub const ADVICE: &str = "Conseil : Vérifie toujours les résultats par toi-même pour t'assurer d'avoir bien compris le raisonnement !";

/// Instruction sent alongside the photo: final answers only, nothing else
pub const INSTRUCTION: &str = "Analyse cette image de devoir.
Fournis UNIQUEMENT les résultats et réponses finales aux exercices.
NE DONNE AUCUNE EXPLICATION, aucune étape de calcul, aucun texte d'introduction ni de conclusion.
Sois extrêmement concis. Affiche juste les réponses directement.";
