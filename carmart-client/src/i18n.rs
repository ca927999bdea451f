use crate::{
    api::{Condition, FuelType, Language, ListingStatus, Plan, Transmission},
    wizard::WizardStep,
};

/// Something that has a user-facing name in every supported language
pub trait Localized {
    fn label(&self, lang: Language) -> &'static str;
}

macro_rules! localized {
    ($typ:ident, $($variant:ident => ($en:expr, $ar:expr)),* $(,)?) => {
        impl Localized for $typ {
            fn label(&self, lang: Language) -> &'static str {
                match (self, lang) {
                    $(
                        ($typ::$variant, Language::En) => $en,
                        ($typ::$variant, Language::Ar) => $ar,
                    )*
                }
            }
        }
    };
}

localized!(ListingStatus,
    Pending => ("Pending review", "قيد المراجعة"),
    Approved => ("Approved", "مقبول"),
    Rejected => ("Rejected", "مرفوض"),
    Sold => ("Sold", "مباع"),
);

localized!(Plan,
    Free => ("Free listing", "إعلان مجاني"),
    Featured => ("Featured listing", "إعلان مميز"),
);

localized!(Transmission,
    Automatic => ("Automatic", "أوتوماتيك"),
    Manual => ("Manual", "يدوي"),
);

localized!(FuelType,
    Petrol => ("Petrol", "بنزين"),
    Diesel => ("Diesel", "ديزل"),
    Hybrid => ("Hybrid", "هجين"),
    Electric => ("Electric", "كهربائي"),
);

localized!(Condition,
    New => ("New", "جديد"),
    Used => ("Used", "مستعمل"),
);

localized!(WizardStep,
    PlanSelection => ("Choose a plan", "اختر الباقة"),
    BasicInfo => ("Basic information", "المعلومات الأساسية"),
    Details => ("Car details", "تفاصيل السيارة"),
    Images => ("Photos", "الصور"),
    Review => ("Review", "المراجعة"),
    Submitted => ("Submitted", "تم الإرسال"),
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels() {
        assert_eq!(ListingStatus::Sold.label(Language::En), "Sold");
        assert_eq!(ListingStatus::Sold.label(Language::Ar), "مباع");
        assert_eq!(Plan::Featured.label(Language::Ar), "إعلان مميز");
        for s in ListingStatus::ALL {
            assert!(!s.label(Language::En).is_empty());
            assert!(!s.label(Language::Ar).is_empty());
        }
    }
}
