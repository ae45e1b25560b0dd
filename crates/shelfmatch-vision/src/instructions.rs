//! Decision-policy instructions sent with every vision request.
//!
//! The vision service is a general image-comparison model; these texts pin
//! down what each tier means and how the joint selection must weigh visual
//! evidence against noisy extracted metadata. Downstream interpretation
//! (consolidation, eligibility thresholds) assumes the service was given
//! exactly these definitions.

/// Tier definitions for the pairwise classification call.
pub(crate) const TIER_POLICY: &str = "\
Classify the candidate product against the shelf item photo into exactly one tier.\n\
- identical: same brand, same product, same variant, same size, same packaging.\n\
- almost_same: same brand and product line, differing in exactly one dimension: \
size, flavor, or a minor packaging revision.\n\
- not_match: different brand, or a different product type entirely.\n\
Report a confidence in [0,1] and a visual_similarity in [0,1] using these bands: \
0.9-1.0 identical-looking products; 0.7-0.9 close variants; 0.3-0.6 same brand but \
different product line; 0.0-0.3 different brands. Explain your reasoning briefly.";

/// Two-step selection policy for the joint multi-candidate call.
pub(crate) const SELECTION_POLICY: &str = "\
Pick the single catalog candidate that best matches the shelf item photo, or null \
if none does.\n\
Step 1 - visual similarity is the primary identity signal, because extracted size \
and flavor text is error-prone. Score every candidate's visual similarity in [0,1] \
and report the full list in submission order. Candidates at or above 0.70 are the \
eligible set.\n\
Step 2 - only when two or more candidates are eligible, tie-break on metadata, \
fuzzily: brand must match allowing minor spelling variation; sizes within 20% of \
each other or equivalent across units count as matching; flavors are compared by \
meaning, not exact text (Strawberry matches Straw).\n\
If exactly one candidate is eligible, select it even when minor metadata disagrees. \
If none is eligible, select null. Report brand_match, size_match, and flavor_match \
flags for the selected candidate and explain your reasoning briefly.";
