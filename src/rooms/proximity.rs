use crate::core::geometry::BBox;

/// Distance limits expressed relative to the page diagonal so they hold at
/// any render resolution.
#[derive(Debug, Clone, Copy)]
pub struct Proximity {
    max_distance: f32,
    direction_bonus: f32,
}

impl Proximity {
    pub fn for_page(page: &BBox, max_distance_fraction: f32, direction_bonus_fraction: f32) -> Self {
        let max_distance = page.diagonal() * max_distance_fraction;
        Self {
            max_distance,
            direction_bonus: max_distance * direction_bonus_fraction,
        }
    }

    pub fn max_distance(&self) -> f32 {
        self.max_distance
    }

    /// Labels are usually stacked number-over-name, so a name below the
    /// number is preferred. Lower is better; `None` when the candidate lies
    /// outside the threshold.
    pub fn score(&self, number: &BBox, name: &BBox) -> Option<f32> {
        let distance = number.center_distance(name);
        if distance > self.max_distance {
            return None;
        }
        let below = name.center().1 > number.center().1;
        Some(if below {
            distance - self.direction_bonus
        } else {
            distance
        })
    }

    /// Index of the best-scoring candidate among those still available.
    /// Ties go to the earliest candidate in page order.
    pub fn nearest<'a, I>(&self, number: &BBox, candidates: I) -> Option<usize>
    where
        I: IntoIterator<Item = (usize, &'a BBox)>,
    {
        let mut best: Option<(usize, f32)> = None;
        for (idx, bbox) in candidates {
            let Some(score) = self.score(number, bbox) else {
                continue;
            };
            match best {
                Some((_, best_score)) if score >= best_score => {}
                _ => best = Some((idx, score)),
            }
        }
        best.map(|(idx, _)| idx)
    }
}
