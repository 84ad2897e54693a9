use crate::devices::FaceResult;

/// Score of a named blendshape, or 0.0 if there is no face or no such shape
///
/// ```
/// use companion::devices::{BlendshapeCategory, FaceResult};
/// use companion::vision::blendshape_score;
///
/// let face = FaceResult {
///     blendshapes: vec![BlendshapeCategory { name: "jawOpen".into(), score: 0.4 }],
///     transform: None,
/// };
/// assert_eq!(blendshape_score(Some(&face), "jawOpen"), 0.4);
/// assert_eq!(blendshape_score(Some(&face), "eyeBlinkLeft"), 0.0);
/// assert_eq!(blendshape_score(None, "jawOpen"), 0.0);
/// ```
pub fn blendshape_score(result: Option<&FaceResult>, name: &str) -> f32 {
    result
        .and_then(|face| face.blendshapes.iter().find(|c| c.name == name))
        .map(|c| c.score)
        .unwrap_or(0.0)
}
